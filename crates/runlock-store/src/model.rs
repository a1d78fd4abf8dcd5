//! Store data model

/// A key's current state as observed from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// Current value (the holder identity, for lock keys).
    pub value: String,
    /// Monotonically comparable revision token, used to condition
    /// compare-and-swap writes on the exact state that was read.
    pub revision: u64,
    /// Remaining time-to-live in seconds, if the key expires.
    pub ttl: Option<i64>,
}
