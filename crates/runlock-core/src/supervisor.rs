//! Process supervision
//!
//! Consumes lease lifecycle events in emission order and keeps the
//! supervised command consistent with the most recently observed
//! ownership state. Host signals are forwarded to the running child.

use std::process::ExitStatus;

use tokio::process::{Child, Command};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use runlock_common::split_command;

use crate::config::CommandSpec;
use crate::event::{LeaseEvent, LeaseTransition};

/// Error type for supervision failures. Every variant is fatal to the
/// program; the top-level handler performs the actual exit.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("command is empty after tokenization")]
    EmptyCommand,

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command '{command}' failed: {status}")]
    CommandFailed { command: String, status: ExitStatus },

    #[error("failed to wait on child process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to install {0} handler: {1}")]
    SignalSetup(&'static str, #[source] std::io::Error),

    #[error("terminated by {0}")]
    Terminated(&'static str),
}

/// Drives the supervised command in lockstep with lease ownership.
pub struct ProcessSupervisor {
    spec: CommandSpec,
    events: mpsc::Receiver<LeaseEvent>,
}

impl ProcessSupervisor {
    pub fn new(spec: CommandSpec, events: mpsc::Receiver<LeaseEvent>) -> Self {
        Self { spec, events }
    }

    /// Consume lease events until the channel closes (clean exit) or a
    /// fatal condition surfaces.
    pub async fn run(self) -> Result<(), SupervisorError> {
        match self.spec {
            CommandSpec::Single(command) => run_single(self.events, &command).await,
            CommandSpec::Hooks {
                on_acquire,
                on_release,
            } => run_hooks(self.events, &on_acquire, &on_release).await,
        }
    }
}

fn host_signal(kind: SignalKind, name: &'static str) -> Result<Signal, SupervisorError> {
    signal(kind).map_err(|e| SupervisorError::SignalSetup(name, e))
}

/// Single-command mode: one long-lived child, started on acquire, killed
/// on release, restarted on re-acquisition.
async fn run_single(
    mut events: mpsc::Receiver<LeaseEvent>,
    command: &str,
) -> Result<(), SupervisorError> {
    let mut runner = SingleCommand::new(command)?;
    let mut sigint = host_signal(SignalKind::interrupt(), "SIGINT")?;
    let mut sigterm = host_signal(SignalKind::terminate(), "SIGTERM")?;
    let mut sighup = host_signal(SignalKind::hangup(), "SIGHUP")?;

    loop {
        tokio::select! {
            maybe_event = events.recv() => match maybe_event {
                Some(event) => runner.apply(&event).await?,
                None => {
                    debug!("event channel closed, stopping supervision");
                    runner.stop().await;
                    return Ok(());
                }
            },
            exit = runner.wait_exit() => {
                let status = exit.map_err(SupervisorError::Wait)?;
                if status.success() {
                    info!(%status, "supervised process exited on its own");
                } else {
                    return Err(SupervisorError::CommandFailed {
                        command: command.to_string(),
                        status,
                    });
                }
            }
            _ = sigint.recv() => {
                runner.forward_signal(libc::SIGINT, "SIGINT");
                return Err(SupervisorError::Terminated("SIGINT"));
            }
            _ = sigterm.recv() => {
                runner.forward_signal(libc::SIGTERM, "SIGTERM");
                return Err(SupervisorError::Terminated("SIGTERM"));
            }
            _ = sighup.recv() => runner.forward_signal(libc::SIGHUP, "SIGHUP"),
        }
    }
}

/// Command-pair mode: each transition fires the matching command in a
/// detached task; a spawn failure or non-zero exit is fatal.
async fn run_hooks(
    mut events: mpsc::Receiver<LeaseEvent>,
    on_acquire: &str,
    on_release: &str,
) -> Result<(), SupervisorError> {
    let on_acquire = parse_command(on_acquire)?;
    let on_release = parse_command(on_release)?;
    let (failure_tx, mut failures) = mpsc::channel::<SupervisorError>(1);
    let mut sigint = host_signal(SignalKind::interrupt(), "SIGINT")?;
    let mut sigterm = host_signal(SignalKind::terminate(), "SIGTERM")?;
    let mut sighup = host_signal(SignalKind::hangup(), "SIGHUP")?;

    loop {
        tokio::select! {
            maybe_event = events.recv() => match maybe_event {
                Some(event) => {
                    let argv = match event.transition {
                        LeaseTransition::Acquired => on_acquire.clone(),
                        LeaseTransition::Released => on_release.clone(),
                    };
                    info!(
                        transition = %event.transition,
                        command = %argv.join(" "),
                        "running transition command"
                    );
                    let failure_tx = failure_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = run_to_completion(&argv).await {
                            let _ = failure_tx.send(e).await;
                        }
                    });
                }
                None => {
                    debug!("event channel closed, stopping supervision");
                    return Ok(());
                }
            },
            Some(err) = failures.recv() => return Err(err),
            _ = sigint.recv() => return Err(SupervisorError::Terminated("SIGINT")),
            _ = sigterm.recv() => return Err(SupervisorError::Terminated("SIGTERM")),
            _ = sighup.recv() => {
                debug!("no long-lived child in transition-command mode, ignoring SIGHUP")
            }
        }
    }
}

fn parse_command(command: &str) -> Result<Vec<String>, SupervisorError> {
    let argv = split_command(command);
    if argv.is_empty() || argv[0].is_empty() {
        return Err(SupervisorError::EmptyCommand);
    }
    Ok(argv)
}

/// Run a transition command to completion; non-zero exit is an error.
async fn run_to_completion(argv: &[String]) -> Result<(), SupervisorError> {
    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            command: argv[0].clone(),
            source,
        })?;
    let status = child.wait().await.map_err(SupervisorError::Wait)?;
    if status.success() {
        Ok(())
    } else {
        Err(SupervisorError::CommandFailed {
            command: argv.join(" "),
            status,
        })
    }
}

/// State for single-command supervision: at most one running child,
/// exclusively owned here.
struct SingleCommand {
    argv: Vec<String>,
    child: Option<Child>,
}

impl SingleCommand {
    fn new(command: &str) -> Result<Self, SupervisorError> {
        Ok(Self {
            argv: parse_command(command)?,
            child: None,
        })
    }

    async fn apply(&mut self, event: &LeaseEvent) -> Result<(), SupervisorError> {
        match event.transition {
            LeaseTransition::Acquired => self.start(),
            LeaseTransition::Released => {
                self.stop().await;
                Ok(())
            }
        }
    }

    /// Start the child unless one is already running (idempotent start).
    /// stdout/stderr are inherited from the supervisor.
    fn start(&mut self) -> Result<(), SupervisorError> {
        if self.child.is_some() {
            debug!("child already running, ignoring duplicate acquire");
            return Ok(());
        }
        info!(command = %self.argv.join(" "), "starting supervised process");
        let child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                command: self.argv[0].clone(),
                source,
            })?;
        self.child = Some(child);
        Ok(())
    }

    /// Kill and reap the child, if any.
    async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("killing supervised process");
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "kill failed, process may already be gone");
            }
            match child.wait().await {
                Ok(status) => debug!(%status, "supervised process reaped"),
                Err(e) => warn!(error = %e, "failed to reap supervised process"),
            }
        }
    }

    /// Resolve when the running child exits on its own; pends forever
    /// while no child is running.
    async fn wait_exit(&mut self) -> std::io::Result<ExitStatus> {
        match &mut self.child {
            Some(child) => {
                let status = child.wait().await;
                self.child = None;
                status
            }
            None => std::future::pending().await,
        }
    }

    /// Forward a host signal to the running child, if any.
    fn forward_signal(&self, signo: libc::c_int, name: &str) {
        if let Some(pid) = self.pid() {
            info!(signal = name, pid, "forwarding signal to supervised process");
            // SAFETY: plain kill(2) on a pid we hold the child handle for.
            unsafe {
                libc::kill(pid as libc::pid_t, signo);
            }
        }
    }

    fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.id())
    }
}
