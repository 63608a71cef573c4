//! Timestamped full-snapshot backups with bounded retention.
//!
//! Entries live in the same medium as the canonical snapshot, keyed
//! `<backup prefix><ISO timestamp>`. Creation is guarded by an advisory lock
//! (see [`lock`]) and followed by pruning down to `maxBackups` entries.

mod lock;
mod settings;

pub use lock::STALE_AFTER_MILLIS;
pub use settings::{BackupInterval, BackupSettings};

use crate::clock::{iso_timestamp, parse_timestamp};
use crate::model::{CollectionCounts, Snapshot};
use crate::persistence::{decode_document, PersistenceError, StoredSnapshot, FORMAT_VERSION};
use crate::store::Store;
use crate::tasks::BackgroundTask;
use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Backup not found: {0}")]
    NotFound(String),
    #[error("Backup '{key}' is corrupted")]
    Corrupted { key: String },
    #[error("No async runtime available to run the backup timer")]
    NoRuntime,
}

/// Result of a [`BackupManager::create_backup`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created(String),
    /// Another caller holds a fresh lock; nothing was written.
    SkippedLocked,
}

/// Listing entry for one backup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub key: String,
    pub timestamp: String,
    pub saved_at: String,
    pub version: String,
    pub counts: CollectionCounts,
}

/// Every backup in one document, for off-medium archiving.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBundle {
    pub version: String,
    pub exported_at: String,
    pub backups: Vec<BundledBackup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundledBackup {
    pub key: String,
    pub timestamp: String,
    pub data: StoredSnapshot,
}

pub struct BackupManager {
    store: Arc<Store>,
    settings: Mutex<BackupSettings>,
    timer: Mutex<Option<BackgroundTask>>,
}

impl BackupManager {
    /// Create a manager using the persisted settings (or defaults).
    pub fn new(store: Arc<Store>) -> Self {
        let manager = Self {
            store,
            settings: Mutex::new(BackupSettings::default()),
            timer: Mutex::new(None),
        };
        let loaded = manager.load_settings();
        *manager.settings.lock().unwrap_or_else(|e| e.into_inner()) = loaded;
        manager
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Read settings from the medium. Missing or invalid settings yield the
    /// defaults.
    pub fn load_settings(&self) -> BackupSettings {
        let adapter = self.store.adapter();
        let key = &adapter.keys().backup_settings;
        match adapter.medium().get(key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(key = %key, "Invalid backup settings, using defaults: {}", e);
                BackupSettings::default()
            }),
            Ok(None) => BackupSettings::default(),
            Err(e) => {
                warn!(key = %key, "Failed to read backup settings, using defaults: {}", e);
                BackupSettings::default()
            }
        }
    }

    pub fn settings(&self) -> BackupSettings {
        *self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist new settings. A running timer is restarted with the new
    /// interval, or stopped when backups were disabled. A stopped timer stays
    /// stopped.
    pub fn update_settings(self: &Arc<Self>, settings: BackupSettings) -> Result<(), BackupError> {
        let adapter = self.store.adapter();
        let json = serde_json::to_string(&settings).map_err(PersistenceError::from)?;
        adapter.medium().set(&adapter.keys().backup_settings, &json)?;
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = settings;
        info!(
            enabled = settings.enabled,
            interval = %settings.interval,
            max_backups = settings.max_backups,
            "Backup settings updated"
        );

        if self.is_running() {
            self.start()?;
        }
        Ok(())
    }

    /// Start the periodic backup timer if backups are enabled. Replaces any
    /// timer already running.
    pub fn start(self: &Arc<Self>) -> Result<(), BackupError> {
        self.stop();
        let settings = self.settings();
        if !settings.enabled {
            info!("Backups disabled, timer not started");
            return Ok(());
        }

        let manager: Weak<Self> = Arc::downgrade(self);
        let task = BackgroundTask::spawn_periodic("backup", settings.interval.period(), move || {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if let Err(e) = manager.create_backup() {
                error!("Scheduled backup failed: {}", e);
            }
        })
        .map_err(|_| BackupError::NoRuntime)?;

        *self.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        Ok(())
    }

    /// Stop the timer. A tick in progress completes first.
    pub fn stop(&self) {
        if let Some(task) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            debug!(task = task.name(), "Stopping backup timer");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(BackgroundTask::is_running)
    }

    /// Stop the timer and take a final backup when backups are enabled.
    pub fn shutdown(&self) -> Result<Option<BackupOutcome>, BackupError> {
        self.stop();
        if !self.settings().enabled {
            return Ok(None);
        }
        self.create_backup().map(Some)
    }

    /// Write a backup of the current snapshot and prune old entries.
    pub fn create_backup(&self) -> Result<BackupOutcome, BackupError> {
        let adapter = self.store.adapter();
        let keys = adapter.keys();
        let clock = self.store.clock();

        let Some(_guard) = lock::try_acquire(adapter.medium(), &keys.backup_lock, clock.now_millis())?
        else {
            info!("Backup skipped, another backup is in progress");
            return Ok(BackupOutcome::SkippedLocked);
        };

        // Entries are never overwritten: a taken millisecond moves the new
        // entry forward until its key is free.
        let mut at = clock.now();
        let mut saved_at = iso_timestamp(&at);
        let mut key = format!("{}{}", keys.backup_prefix, saved_at);
        while adapter.medium().get(&key)?.is_some() {
            at += chrono::Duration::milliseconds(1);
            saved_at = iso_timestamp(&at);
            key = format!("{}{}", keys.backup_prefix, saved_at);
        }
        let document = StoredSnapshot::capture(&self.store.snapshot(), saved_at);
        let json = serde_json::to_string(&document).map_err(PersistenceError::from)?;
        adapter.medium().set(&key, &json)?;
        info!(key = %key, "Backup created");

        self.prune(self.settings().max_backups)?;
        Ok(BackupOutcome::Created(key))
    }

    /// Delete entries beyond the `keep` most recent. At least one is kept.
    fn prune(&self, keep: usize) -> Result<(), BackupError> {
        let medium = self.store.adapter().medium();
        let mut entries = self.backup_keys()?;
        sort_newest_first(&mut entries);
        for (key, _) in entries.into_iter().skip(keep.max(1)) {
            match medium.remove(&key) {
                Ok(()) => debug!(key = %key, "Pruned old backup"),
                Err(e) => error!(key = %key, "Failed to prune backup: {}", e),
            }
        }
        Ok(())
    }

    /// Backup keys with the timestamp encoded in each.
    fn backup_keys(&self) -> Result<Vec<(String, String)>, BackupError> {
        let keys = self.store.adapter().keys();
        Ok(self
            .store
            .adapter()
            .medium()
            .keys()?
            .into_iter()
            .filter(|key| keys.is_backup_entry(key))
            .map(|key| {
                let timestamp = key[keys.backup_prefix.len()..].to_string();
                (key, timestamp)
            })
            .collect())
    }

    /// Metadata for every readable backup, newest first. Corrupted entries
    /// are left out.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let mut entries = self.backup_keys()?;
        sort_newest_first(&mut entries);

        let mut infos = Vec::with_capacity(entries.len());
        for (key, timestamp) in entries {
            match self.read_document(&key) {
                Ok(document) => infos.push(BackupInfo {
                    counts: document.clone().into_snapshot().counts(),
                    saved_at: document.saved_at,
                    version: document.version,
                    key,
                    timestamp,
                }),
                Err(e) => debug!(key = %key, "Skipping unreadable backup: {}", e),
            }
        }
        Ok(infos)
    }

    /// The snapshot stored in one backup entry.
    pub fn read_backup(&self, key: &str) -> Result<Snapshot, BackupError> {
        Ok(self.read_document(key)?.into_snapshot())
    }

    fn read_document(&self, key: &str) -> Result<StoredSnapshot, BackupError> {
        let adapter = self.store.adapter();
        if !adapter.keys().is_backup_entry(key) {
            return Err(BackupError::NotFound(key.to_string()));
        }
        let raw = adapter
            .medium()
            .get(key)?
            .ok_or_else(|| BackupError::NotFound(key.to_string()))?;
        match decode_document(key, &raw) {
            Ok((document, 0)) => Ok(document),
            Ok((document, dropped)) => {
                warn!(key, dropped, "Backup has unreadable items");
                Ok(document)
            }
            Err(PersistenceError::Corrupted { .. }) => Err(BackupError::Corrupted {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the whole store with a backup, then back up the restored
    /// state.
    ///
    /// The state being replaced is not backed up first.
    pub fn restore_from_backup(&self, key: &str) -> Result<BackupOutcome, BackupError> {
        let snapshot = self.read_backup(key)?;
        let counts = snapshot.counts();
        self.store.replace(snapshot);
        info!(
            key,
            tests = counts.tests,
            attempts = counts.attempts,
            "Restored from backup"
        );
        self.create_backup()
    }

    /// Remove one backup entry. Returns false when it did not exist.
    pub fn delete_backup(&self, key: &str) -> Result<bool, BackupError> {
        let adapter = self.store.adapter();
        if !adapter.keys().is_backup_entry(key) || adapter.medium().get(key)?.is_none() {
            return Ok(false);
        }
        adapter.medium().remove(key)?;
        info!(key, "Backup deleted");
        Ok(true)
    }

    /// Collect every readable backup, newest first.
    pub fn export_backups_bundle(&self) -> Result<BackupBundle, BackupError> {
        let mut entries = self.backup_keys()?;
        sort_newest_first(&mut entries);

        let backups = entries
            .into_iter()
            .filter_map(|(key, timestamp)| match self.read_document(&key) {
                Ok(data) => Some(BundledBackup {
                    key,
                    timestamp,
                    data,
                }),
                Err(e) => {
                    debug!(key = %key, "Leaving unreadable backup out of bundle: {}", e);
                    None
                }
            })
            .collect();

        Ok(BackupBundle {
            version: FORMAT_VERSION.to_string(),
            exported_at: self.store.clock().now_iso(),
            backups,
        })
    }
}

/// Order by parsed timestamp, newest first. Unparsable timestamps sort last.
fn sort_newest_first(entries: &mut [(String, String)]) {
    entries.sort_by(|(a_key, a_ts), (b_key, b_ts)| {
        let a = parse_timestamp(a_ts);
        let b = parse_timestamp(b_ts);
        b.cmp(&a).then_with(|| b_key.cmp(a_key))
    });
}
