//! In-memory store implementation
//!
//! A process-local [`KvStore`] used by tests and multi-coordinator
//! simulations. TTL expiry is evaluated lazily on access: an expired entry
//! reads as absent and may be overwritten by `create_if_absent`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::KvStore;
use crate::error::Result;
use crate::model::KvEntry;

struct StoredEntry {
    value: String,
    revision: u64,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(value: &str, revision: u64, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            revision,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn remaining_secs(&self) -> i64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_secs() as i64
    }
}

/// In-memory [`KvStore`] with lazily-evaluated TTLs.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, StoredEntry>,
    revision: AtomicU64,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Unconditionally overwrite a key (admin/test hook), bumping the
    /// revision so in-flight compare-and-swap renewals fail.
    pub fn force_put(&self, key: &str, value: &str, ttl: Duration) {
        let revision = self.next_revision();
        self.entries
            .insert(key.to_string(), StoredEntry::new(value, revision, ttl));
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let revision = self.next_revision();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_expired() => {
                occupied.insert(StoredEntry::new(value, revision, ttl));
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(value, revision, ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        Ok(self.entries.get(key).and_then(|entry| {
            if entry.is_expired() {
                None
            } else {
                Some(KvEntry {
                    value: entry.value.clone(),
                    revision: entry.revision,
                    ttl: Some(entry.remaining_secs()),
                })
            }
        }))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: &str,
        expected_revision: u64,
        ttl: Duration,
    ) -> Result<bool> {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() && entry.revision == expected_revision => {
                let revision = self.next_revision();
                *entry = StoredEntry::new(value, revision, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
