//! Advisory backup lock: a key holding the acquisition time in epoch millis.
//!
//! Not a mutex. Two callers that both read an absent lock can still both
//! proceed; this only keeps a timer tick and a teardown backup in the same
//! process from writing duplicate entries.

use crate::persistence::{PersistenceError, SharedMedium};

/// A lock older than this is abandoned and may be taken over.
pub const STALE_AFTER_MILLIS: i64 = 5 * 60 * 1000;

/// Held lock. Releasing happens on drop, including on error paths.
pub(crate) struct LockGuard<'a> {
    medium: &'a SharedMedium,
    key: &'a str,
}

/// Try to take the lock at `now_millis`.
///
/// Returns `None` while a fresh lock is held by someone else. A stale or
/// unreadable lock value is overridden.
pub(crate) fn try_acquire<'a>(
    medium: &'a SharedMedium,
    key: &'a str,
    now_millis: i64,
) -> Result<Option<LockGuard<'a>>, PersistenceError> {
    if let Some(raw) = medium.get(key)? {
        match raw.trim().parse::<i64>() {
            Ok(acquired_at) if now_millis - acquired_at < STALE_AFTER_MILLIS => {
                tracing::debug!(key, acquired_at, "Backup lock is held");
                return Ok(None);
            }
            Ok(acquired_at) => {
                tracing::warn!(key, acquired_at, "Overriding stale backup lock");
            }
            Err(_) => {
                tracing::warn!(key, value = %raw, "Overriding unreadable backup lock");
            }
        }
    }
    medium.set(key, &now_millis.to_string())?;
    Ok(Some(LockGuard { medium, key }))
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.medium.remove(self.key) {
            tracing::error!(key = self.key, "Failed to release backup lock: {}", e);
        }
    }
}
