//! End-to-end flows: a real coordinator driving a real supervisor over
//! the event channel, with the in-memory store standing in for etcd.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use runlock_common::lock_key_path;
use runlock_core::{CommandSpec, LockCoordinator, ProcessSupervisor};
use runlock_store::MemoryKvStore;

const HEARTBEAT: Duration = Duration::from_millis(20);
const TTL: Duration = Duration::from_millis(120);

async fn wait_for(path: &Path) {
    for _ in 0..250 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("marker {} never appeared", path.display());
}

#[tokio::test]
async fn test_hooks_fire_across_acquisition_and_loss() {
    let dir = tempfile::tempdir().unwrap();
    let acquired_marker = dir.path().join("acquired");
    let released_marker = dir.path().join("released");

    let store = Arc::new(MemoryKvStore::new());
    // Depth 1, as in production wiring.
    let (tx, rx) = mpsc::channel(1);
    let coordinator = LockCoordinator::new(store.clone(), "jobs", "node-a", TTL, HEARTBEAT, tx);
    let lock_loop = tokio::spawn(coordinator.run());

    let supervisor = ProcessSupervisor::new(
        CommandSpec::Hooks {
            on_acquire: format!("touch {}", acquired_marker.display()),
            on_release: format!("touch {}", released_marker.display()),
        },
        rx,
    );
    let supervision = tokio::spawn(supervisor.run());

    wait_for(&acquired_marker).await;
    assert!(!released_marker.exists());

    // Another writer takes the key over; the coordinator notices and the
    // release hook runs.
    store.force_put(&lock_key_path("jobs"), "usurper", Duration::from_secs(30));
    wait_for(&released_marker).await;

    lock_loop.abort();
    supervision.abort();
}

#[tokio::test]
async fn test_single_command_starts_on_acquisition() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started");

    let store = Arc::new(MemoryKvStore::new());
    let (tx, rx) = mpsc::channel(1);
    let coordinator = LockCoordinator::new(store.clone(), "jobs", "node-a", TTL, HEARTBEAT, tx);
    let lock_loop = tokio::spawn(coordinator.run());

    let supervisor = ProcessSupervisor::new(
        CommandSpec::Single(format!("touch {}", marker.display())),
        rx,
    );
    let supervision = tokio::spawn(supervisor.run());

    wait_for(&marker).await;

    lock_loop.abort();
    supervision.abort();
}
