//! Runlock Store - external key-value store surface
//!
//! This crate provides:
//! - The [`KvStore`] trait: the three conditional-write primitives the lock
//!   coordinator is built on
//! - [`EtcdKvStore`]: the etcd v2 keys-API implementation
//! - [`MemoryKvStore`]: a process-local implementation for tests and
//!   simulations

use std::time::Duration;

use async_trait::async_trait;

pub mod error;
pub mod etcd;
pub mod memory;
pub mod model;

// Re-export commonly used types
pub use error::{Result, StoreError};
pub use etcd::{EtcdConfig, EtcdKvStore};
pub use memory::MemoryKvStore;
pub use model::KvEntry;

/// The store capability surface consumed by the lock coordinator.
///
/// All three operations are conditional writes or reads against a
/// strongly-consistent store; the store itself is the sole arbiter of
/// who wins a creation race.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Create `key` with `value` and a TTL, only if the key does not
    /// currently exist.
    ///
    /// Returns `Ok(true)` when this call raced and won, `Ok(false)` when
    /// the key already exists (expected contention), and `Err` on
    /// transport or protocol failure.
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Read the current value and revision of `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<KvEntry>>;

    /// Write `value` and refresh the TTL, only if the key's current
    /// revision equals `expected_revision`.
    ///
    /// Returns `Ok(false)` when another writer intervened; that outcome
    /// must not be treated as fatal by callers.
    async fn compare_and_swap(
        &self,
        key: &str,
        value: &str,
        expected_revision: u64,
        ttl: Duration,
    ) -> Result<bool>;
}
