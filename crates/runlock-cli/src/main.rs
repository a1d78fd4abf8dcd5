//! Main entry point for the runlock binary.
//!
//! Wires configuration into the two long-lived tasks: the lock
//! coordinator polling the store, and the process supervisor consuming
//! its ownership transitions.

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use runlock_core::{CommandSpec, ConfigError, LockCoordinator, ProcessSupervisor, Settings};
use runlock_store::{EtcdConfig, EtcdKvStore};

#[derive(Debug, Parser)]
#[command(name = "runlock", version, about = "Locks running things.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the locker.
    #[command(visible_alias = "r")]
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// The etcd endpoint to lock on.
    #[arg(
        long,
        env = "RUNLOCK_ETCD_ENDPOINT",
        default_value = "http://localhost:2379"
    )]
    etcd: String,

    /// The key to use to lock the service.
    #[arg(long, env = "RUNLOCK_LOCK_KEY")]
    key: String,

    /// The TTL in seconds for the lock.
    #[arg(long, env = "RUNLOCK_TTL", default_value_t = 5)]
    ttl: u64,

    /// How often to renew the lock, in seconds.
    #[arg(long, env = "RUNLOCK_HEARTBEAT", default_value_t = 3)]
    heartbeat: u64,

    /// The command to run while the lock is held, like 'echo hello'.
    #[arg(long, conflicts_with_all = ["on_acquire", "on_release"])]
    command: Option<String>,

    /// Command to run when the lock is acquired.
    #[arg(long, requires = "on_release")]
    on_acquire: Option<String>,

    /// Command to run when the lock is released.
    #[arg(long, requires = "on_acquire")]
    on_release: Option<String>,

    /// Explicit holder identity (defaults to a generated UUID).
    #[arg(long, env = "RUNLOCK_IDENTITY")]
    identity: Option<String>,
}

impl RunArgs {
    fn to_settings(&self) -> Result<Settings, ConfigError> {
        let command = match (&self.command, &self.on_acquire, &self.on_release) {
            (Some(command), None, None) => CommandSpec::Single(command.clone()),
            (None, Some(on_acquire), Some(on_release)) => CommandSpec::Hooks {
                on_acquire: on_acquire.clone(),
                on_release: on_release.clone(),
            },
            _ => return Err(ConfigError::MissingCommand),
        };

        Ok(Settings {
            endpoint: self.etcd.clone(),
            key: self.key.clone(),
            ttl_secs: self.ttl,
            heartbeat_secs: self.heartbeat,
            identity: self.identity.clone(),
            command,
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let Commands::Run(args) = cli.command;

    if let Err(e) = run(args).await {
        error!("runlock terminated: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let settings = args.to_settings()?;
    settings.validate()?;

    let identity = settings
        .identity
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let store = Arc::new(EtcdKvStore::new(EtcdConfig::new(&settings.endpoint))?);

    // Depth 1 is enough: the coordinator never emits the same transition
    // twice in a row without an intervening state change.
    let (events_tx, events_rx) = mpsc::channel(1);

    let coordinator = LockCoordinator::new(
        store,
        &settings.key,
        &identity,
        settings.ttl(),
        settings.heartbeat(),
        events_tx,
    );
    info!(key = %coordinator.key(), identity = %identity, "runlock starting");

    let lock_loop = tokio::spawn(coordinator.run());
    let supervisor = ProcessSupervisor::new(settings.command.clone(), events_rx);

    // The supervisor runs until a fatal condition of its own, or until the
    // event channel closes because the coordinator died. In the latter
    // case the child has already been stopped, and the coordinator's
    // error is the one worth reporting.
    match supervisor.run().await {
        Ok(()) => match lock_loop.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(e.into()),
        },
        Err(e) => {
            lock_loop.abort();
            Err(e.into())
        }
    }
}
