//! Lease lifecycle events
//!
//! Produced by the coordinator, consumed exactly once each by the
//! supervisor, in emission order.

use std::fmt;

use runlock_common::now_millis;

/// The kind of ownership transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseTransition {
    Acquired,
    Released,
}

impl fmt::Display for LeaseTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseTransition::Acquired => write!(f, "acquired"),
            LeaseTransition::Released => write!(f, "released"),
        }
    }
}

/// An ownership transition, timestamped at emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseEvent {
    pub transition: LeaseTransition,
    /// Unix millis at emission time.
    pub occurred_at: i64,
}

impl LeaseEvent {
    pub fn new(transition: LeaseTransition) -> Self {
        Self {
            transition,
            occurred_at: now_millis(),
        }
    }

    pub fn acquired() -> Self {
        Self::new(LeaseTransition::Acquired)
    }

    pub fn released() -> Self {
        Self::new(LeaseTransition::Released)
    }
}
