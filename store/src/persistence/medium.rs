use super::PersistenceError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// A durable string key-value medium.
///
/// Writes are synchronous. Implementations report quota or I/O failures as
/// errors and never retry.
pub trait KeyValueMedium: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
    /// Every key currently stored, in ascending order.
    fn keys(&self) -> Result<Vec<String>, PersistenceError>;
}

pub type SharedMedium = Arc<dyn KeyValueMedium>;

/// In-process medium. An optional byte quota (keys plus values) makes writes
/// fail the way a full browser storage area does.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: Mutex<BTreeMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota: Some(bytes),
        }
    }

    /// Total bytes used by keys and values.
    pub fn used_bytes(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KeyValueMedium for MemoryMedium {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(quota) = self.quota {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            if used + needed > quota {
                return Err(PersistenceError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.keys().cloned().collect())
    }
}
