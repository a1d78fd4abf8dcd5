//! Runtime configuration
//!
//! Explicit settings struct for a coordinator instance, with all
//! preconditions validated before any store interaction happens.

use std::time::Duration;

use url::Url;

/// Which supervision mode the supervisor runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// One long-lived command, started on acquire and killed on release.
    Single(String),
    /// A command pair: each transition fires the matching command, run to
    /// completion independently of subsequent events.
    Hooks {
        on_acquire: String,
        on_release: String,
    },
}

/// Settings for one coordinator instance: one store endpoint, one lock
/// key, one supervised command.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Store endpoint, e.g. `http://localhost:2379`.
    pub endpoint: String,
    /// Caller-supplied lock key (normalized by the coordinator).
    pub key: String,
    /// Lease time-to-live in seconds.
    pub ttl_secs: u64,
    /// Renewal interval in seconds; must be strictly below the TTL.
    pub heartbeat_secs: u64,
    /// Explicit holder identity; a unique one is generated when absent.
    pub identity: Option<String>,
    /// The supervised command(s).
    pub command: CommandSpec,
}

/// Error type for rejected configurations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("lock key is required")]
    MissingKey,

    #[error("a command is required: pass --command, or both --on-acquire and --on-release")]
    MissingCommand,

    #[error("ttl and heartbeat must be at least 1 second")]
    NonPositiveInterval,

    #[error("heartbeat ({heartbeat}s) must be strictly less than ttl ({ttl}s)")]
    HeartbeatNotBelowTtl { heartbeat: u64, ttl: u64 },

    #[error("invalid store endpoint '{0}'")]
    InvalidEndpoint(String),
}

impl Settings {
    /// Check all preconditions. A heartbeat at or above the TTL would let
    /// the lease expire before its holder renews it, causing spurious
    /// loss even under no failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key.trim().is_empty() {
            return Err(ConfigError::MissingKey);
        }

        let command_missing = match &self.command {
            CommandSpec::Single(command) => command.trim().is_empty(),
            CommandSpec::Hooks {
                on_acquire,
                on_release,
            } => on_acquire.trim().is_empty() || on_release.trim().is_empty(),
        };
        if command_missing {
            return Err(ConfigError::MissingCommand);
        }

        if self.ttl_secs == 0 || self.heartbeat_secs == 0 {
            return Err(ConfigError::NonPositiveInterval);
        }
        if self.heartbeat_secs >= self.ttl_secs {
            return Err(ConfigError::HeartbeatNotBelowTtl {
                heartbeat: self.heartbeat_secs,
                ttl: self.ttl_secs,
            });
        }

        match Url::parse(&self.endpoint) {
            Ok(url) if (url.scheme() == "http" || url.scheme() == "https") && url.has_host() => {
                Ok(())
            }
            _ => Err(ConfigError::InvalidEndpoint(self.endpoint.clone())),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}
