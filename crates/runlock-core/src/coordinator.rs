//! Lock coordination
//!
//! The poll/renew loop that decides lease ownership. Every heartbeat it
//! races for the empty slot, reads the current holder, and either renews
//! its own lease or reports the transition.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use runlock_common::lock_key_path;
use runlock_store::{KvStore, StoreError};

use crate::event::{LeaseEvent, LeaseTransition};

/// Error type for fatal coordinator failures.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Reading lease state failed. A coordinator that cannot tell who
    /// holds the lock must not guess; this terminates the program.
    #[error("reading lock state for '{key}' failed: {source}")]
    StoreRead {
        key: String,
        #[source]
        source: StoreError,
    },

    /// The supervisor side of the event channel is gone.
    #[error("lease event channel closed")]
    EventChannelClosed,
}

/// Continuously attempts to become, or remain, the holder of one lock key,
/// emitting `Acquired`/`Released` on every ownership transition.
pub struct LockCoordinator {
    store: Arc<dyn KvStore>,
    key: String,
    identity: String,
    ttl: Duration,
    heartbeat: Duration,
    events: mpsc::Sender<LeaseEvent>,
    held: bool,
}

impl LockCoordinator {
    /// Create a coordinator for `key`, normalized under the lock
    /// namespace. `events` receives every transition in emission order.
    pub fn new(
        store: Arc<dyn KvStore>,
        key: &str,
        identity: &str,
        ttl: Duration,
        heartbeat: Duration,
        events: mpsc::Sender<LeaseEvent>,
    ) -> Self {
        Self {
            store,
            key: lock_key_path(key),
            identity: identity.to_string(),
            ttl,
            heartbeat,
            events,
            held: false,
        }
    }

    /// The normalized key this coordinator locks on.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run the poll/renew loop until a fatal error. There is no other
    /// exit: losing the lease is an event, not a failure, and crash
    /// recovery is delegated to TTL expiry in the store.
    pub async fn run(mut self) -> Result<(), CoordinatorError> {
        info!(key = %self.key, identity = %self.identity, "starting lock coordination");
        loop {
            self.poll_once().await?;
        }
    }

    /// One iteration: race for the empty slot, read the holder, then
    /// either renew or wait out a heartbeat.
    async fn poll_once(&mut self) -> Result<(), CoordinatorError> {
        // Best effort: expected to fail whenever someone holds the lease.
        if let Err(e) = self
            .store
            .create_if_absent(&self.key, &self.identity, self.ttl)
            .await
        {
            debug!(key = %self.key, error = %e, "create attempt failed");
        }

        let observed = self
            .store
            .get(&self.key)
            .await
            .map_err(|source| CoordinatorError::StoreRead {
                key: self.key.clone(),
                source,
            })?;

        match observed {
            Some(entry) if entry.value == self.identity => {
                debug!(key = %self.key, revision = entry.revision, "I have the lock");
                if !self.held {
                    self.held = true;
                    info!(key = %self.key, "lock acquired");
                    self.emit(LeaseTransition::Acquired).await?;
                }

                tokio::time::sleep(self.heartbeat).await;

                // Renew against the revision observed above, never a stale
                // one; a lost race here resolves on the next read.
                match self
                    .store
                    .compare_and_swap(&self.key, &self.identity, entry.revision, self.ttl)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(
                            key = %self.key,
                            revision = entry.revision,
                            "lease renewal superseded by another writer"
                        )
                    }
                    Err(e) => warn!(key = %self.key, error = %e, "lease renewal failed"),
                }
            }
            observed => {
                let holder = observed.map(|entry| entry.value);
                debug!(key = %self.key, holder = ?holder, "I don't have the lock");
                if self.held {
                    self.held = false;
                    info!(key = %self.key, "lock lost");
                    self.emit(LeaseTransition::Released).await?;
                }
                tokio::time::sleep(self.heartbeat).await;
            }
        }

        Ok(())
    }

    async fn emit(&self, transition: LeaseTransition) -> Result<(), CoordinatorError> {
        self.events
            .send(LeaseEvent::new(transition))
            .await
            .map_err(|_| CoordinatorError::EventChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use runlock_store::{KvEntry, MemoryKvStore};
    use tokio::time::timeout;

    use super::*;

    const HEARTBEAT: Duration = Duration::from_millis(10);
    const TTL: Duration = Duration::from_millis(100);

    fn spawn_coordinator(
        store: Arc<MemoryKvStore>,
        identity: &str,
    ) -> (
        tokio::task::JoinHandle<Result<(), CoordinatorError>>,
        mpsc::Receiver<LeaseEvent>,
    ) {
        let (tx, rx) = mpsc::channel(8);
        let coordinator = LockCoordinator::new(store, "jobs", identity, TTL, HEARTBEAT, tx);
        (tokio::spawn(coordinator.run()), rx)
    }

    #[tokio::test]
    async fn test_key_is_normalized() {
        let (tx, _rx) = mpsc::channel(1);
        let coordinator = LockCoordinator::new(
            Arc::new(MemoryKvStore::new()),
            "foo/bar",
            "node-a",
            TTL,
            HEARTBEAT,
            tx,
        );
        assert_eq!(coordinator.key(), "/runlock/locks/foo/bar");
    }

    #[tokio::test]
    async fn test_acquires_empty_slot_and_emits_once() {
        let store = Arc::new(MemoryKvStore::new());
        let (handle, mut rx) = spawn_coordinator(store.clone(), "node-a");

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.transition, LeaseTransition::Acquired);
        assert_eq!(
            store.get("/runlock/locks/jobs").await.unwrap().unwrap().value,
            "node-a"
        );

        // Still the holder: no further transition is emitted.
        assert!(
            timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_renewal_outlives_the_ttl() {
        let store = Arc::new(MemoryKvStore::new());
        let (handle, mut rx) = spawn_coordinator(store.clone(), "node-a");

        timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();

        // Several TTLs later the lease is still held because every
        // heartbeat refreshed it.
        tokio::time::sleep(TTL * 3).await;
        assert_eq!(
            store.get("/runlock/locks/jobs").await.unwrap().unwrap().value,
            "node-a"
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_never_held_emits_no_release() {
        let store = Arc::new(MemoryKvStore::new());
        store
            .create_if_absent("/runlock/locks/jobs", "someone-else", Duration::from_secs(30))
            .await
            .unwrap();

        let (handle, mut rx) = spawn_coordinator(store, "node-a");

        // Many iterations of "not the holder": nothing to release, so
        // nothing may be emitted.
        assert!(
            timeout(Duration::from_millis(200), rx.recv())
                .await
                .is_err()
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_release_emitted_once_after_supersession() {
        let store = Arc::new(MemoryKvStore::new());
        let (handle, mut rx) = spawn_coordinator(store.clone(), "node-a");

        let first = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.transition, LeaseTransition::Acquired);

        store.force_put("/runlock/locks/jobs", "usurper", Duration::from_secs(30));

        let second = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.transition, LeaseTransition::Released);

        // The usurper keeps the lock; no further transitions.
        assert!(
            timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_store_read_error_is_fatal() {
        struct FailingStore;

        #[async_trait]
        impl KvStore for FailingStore {
            async fn create_if_absent(
                &self,
                _key: &str,
                _value: &str,
                _ttl: Duration,
            ) -> runlock_store::Result<bool> {
                Ok(false)
            }

            async fn get(&self, _key: &str) -> runlock_store::Result<Option<KvEntry>> {
                Err(StoreError::UnexpectedResponse {
                    status: 502,
                    body: "bad gateway".to_string(),
                })
            }

            async fn compare_and_swap(
                &self,
                _key: &str,
                _value: &str,
                _expected_revision: u64,
                _ttl: Duration,
            ) -> runlock_store::Result<bool> {
                Ok(false)
            }
        }

        let (tx, _rx) = mpsc::channel(8);
        let coordinator =
            LockCoordinator::new(Arc::new(FailingStore), "jobs", "node-a", TTL, HEARTBEAT, tx);

        let err = timeout(Duration::from_secs(1), coordinator.run())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::StoreRead { .. }));
    }
}
