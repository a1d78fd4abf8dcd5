//! Utility functions for runlock
//!
//! Common helper functions used across the workspace.

use crate::LOCK_KEY_PREFIX;

/// Normalize a caller-supplied lock key into its stored form.
///
/// Every lock key lives under [`LOCK_KEY_PREFIX`] with exactly one separator
/// between the prefix and the key body, regardless of whether the caller
/// supplied a leading slash.
///
/// # Examples
///
/// ```
/// use runlock_common::lock_key_path;
///
/// assert_eq!(lock_key_path("jobs/nightly"), "/runlock/locks/jobs/nightly");
/// assert_eq!(lock_key_path("/jobs/nightly"), "/runlock/locks/jobs/nightly");
/// ```
pub fn lock_key_path(key: &str) -> String {
    if key.starts_with('/') {
        format!("{}{}", LOCK_KEY_PREFIX, key)
    } else {
        format!("{}/{}", LOCK_KEY_PREFIX, key)
    }
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
