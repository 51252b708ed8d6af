use std::time;

/// Get the current system time in epoch format.
///
/// Scrobble timestamps, policy checks and backoff gates are all exchanged
/// as whole seconds since the Unix epoch, matching the wire protocol.
///
/// # Panics
///
/// Panics if the system time is before epoch.
#[must_use]
pub fn now_from_epoch() -> u64 {
    time::SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .expect("system time is before epoch")
        .as_secs()
}
