//! Shared utility functions
//! Common helpers used across the codebase

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in seconds
/// Consistent implementation used throughout the codebase
#[inline]
#[must_use]
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Get current Unix timestamp in milliseconds
#[inline]
#[must_use]
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
