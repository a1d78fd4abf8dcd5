//! Runlock Core - lease coordination and process supervision
//!
//! This crate provides:
//! - Runtime configuration and its preconditions
//! - Lease lifecycle events
//! - [`LockCoordinator`]: the poll/renew loop deriving ownership
//!   transitions from the external store
//! - [`ProcessSupervisor`]: the child-process lifecycle bound to those
//!   transitions

pub mod config;
pub mod coordinator;
pub mod event;
pub mod supervisor;

// Re-export commonly used types
pub use config::{CommandSpec, ConfigError, Settings};
pub use coordinator::{CoordinatorError, LockCoordinator};
pub use event::{LeaseEvent, LeaseTransition};
pub use supervisor::{ProcessSupervisor, SupervisorError};
