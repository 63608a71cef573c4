mod adapter;
mod file_medium;
mod medium;

pub(crate) use adapter::decode_document;
pub use adapter::{PersistenceAdapter, StoredSnapshot, FORMAT_VERSION};
pub use file_medium::FileMedium;
pub use medium::{KeyValueMedium, MemoryMedium, SharedMedium};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage quota exceeded writing '{key}' ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },
    #[error("Corrupted entry '{key}': {reason}")]
    Corrupted { key: String, reason: String },
}

/// Names of every key the core reads or writes in the durable medium.
///
/// All keys share one namespace prefix so several installations can live in
/// the same medium without colliding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub canonical: String,
    pub legacy_tests: String,
    pub legacy_attempts: String,
    pub legacy_question_bank: String,
    pub legacy_scoring_profiles: String,
    pub backup_prefix: String,
    pub backup_lock: String,
    pub backup_settings: String,
    pub migration_marker: String,
    /// Prefix for raw copies of canonical blobs that could not be fully read.
    pub quarantine_prefix: String,
}

impl StorageKeys {
    pub const DEFAULT_NAMESPACE: &'static str = "exam";

    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            canonical: format!("{namespace}_data"),
            legacy_tests: format!("{namespace}_tests"),
            legacy_attempts: format!("{namespace}_attempts"),
            legacy_question_bank: format!("{namespace}_question_bank"),
            legacy_scoring_profiles: format!("{namespace}_scoring_profiles"),
            backup_prefix: format!("{namespace}_backup_"),
            backup_lock: format!("{namespace}_backup_lock"),
            backup_settings: format!("{namespace}_backup_settings"),
            migration_marker: format!("{namespace}_migration_done"),
            quarantine_prefix: format!("{namespace}_quarantine_"),
        }
    }

    /// Whether `key` names a backup entry (as opposed to the lock or settings
    /// keys that share the backup prefix).
    pub fn is_backup_entry(&self, key: &str) -> bool {
        key.starts_with(&self.backup_prefix)
            && key != self.backup_lock
            && key != self.backup_settings
    }

    /// Keys owned by the core's own bookkeeping, never legacy data.
    pub fn is_bookkeeping(&self, key: &str) -> bool {
        key == self.canonical
            || key == self.backup_lock
            || key == self.backup_settings
            || key == self.migration_marker
            || self.is_backup_entry(key)
            || key.starts_with(&self.quarantine_prefix)
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::with_namespace(Self::DEFAULT_NAMESPACE)
    }
}
