//! Configuration for the examdesk binary.
//!
//! Every tunable has a compile-time default and can be overridden at runtime
//! through a dedicated environment variable.

use std::path::PathBuf;

const DEFAULT_CONFIG_DIR: &str = ".config/examdesk/data";
const DEV_DATA_DIR: &str = "./data";

/// Default autosave period in seconds.
const DEFAULT_AUTOSAVE_SECS: u64 = 30;

/// Get the data directory backing the file medium.
///
/// Priority:
/// 1. `EXAMDESK_DATA_DIR` env variable if set
/// 2. `$HOME/.config/examdesk/data` if HOME is set
/// 3. `./data` as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("EXAMDESK_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// Get the namespace prepended to every storage key.
///
/// Priority:
/// 1. `EXAMDESK_KEY_PREFIX` env variable if set and non-empty
/// 2. `exam` as fallback
pub fn get_key_prefix() -> String {
    match std::env::var("EXAMDESK_KEY_PREFIX") {
        Ok(prefix) if !prefix.trim().is_empty() => prefix.trim().to_string(),
        _ => exam_store::StorageKeys::DEFAULT_NAMESPACE.to_string(),
    }
}

/// Get the autosave period in seconds.
///
/// Falls back to the default when `EXAMDESK_AUTOSAVE_SECS` is unset, not a
/// `u64`, or zero.
pub fn get_autosave_secs() -> u64 {
    std::env::var("EXAMDESK_AUTOSAVE_SECS")
        .ok()
        .and_then(|secs| secs.parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_AUTOSAVE_SECS)
}

/// Directory for daily rolling log files. `None` logs to stderr only.
pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var("EXAMDESK_LOG_DIR").ok().map(PathBuf::from)
}
