//! Test support for the runlock integration tests.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use runlock_core::{LeaseEvent, LeaseTransition};

/// Receive the next lease transition, failing the test on timeout.
pub async fn expect_transition(
    rx: &mut mpsc::Receiver<LeaseEvent>,
    within: Duration,
) -> LeaseTransition {
    timeout(within, rx.recv())
        .await
        .expect("timed out waiting for a lease event")
        .expect("event channel closed")
        .transition
}

/// Assert that no lease event arrives within the window.
pub async fn expect_silence(rx: &mut mpsc::Receiver<LeaseEvent>, within: Duration) {
    if let Ok(Some(event)) = timeout(within, rx.recv()).await {
        panic!("unexpected lease event: {event:?}");
    }
}
