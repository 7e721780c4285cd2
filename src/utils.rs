//! General utilities shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen
/// in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generates a short human-shareable join code (6 uppercase hex characters).
#[must_use]
pub fn generate_join_code() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..6].to_uppercase()
}
