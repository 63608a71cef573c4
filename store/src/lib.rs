//! Persistence and data-lifecycle core for exam authoring.
//!
//! A single [`Store`] holds the current snapshot of tests, attempts, the
//! question bank and scoring profiles, backed by a string key-value medium.
//! [`Repository`] edits it, [`BackupManager`] keeps timed backups, and
//! [`migrate_legacy_data`] folds in data left by older storage formats.

pub mod backup;
pub mod clock;
pub mod lens;
pub mod migration;
pub mod model;
pub mod persistence;
pub mod repository;
pub mod store;
pub mod tasks;
pub mod transfer;

// Re-export commonly used items
pub use backup::{BackupError, BackupInfo, BackupInterval, BackupManager, BackupOutcome, BackupSettings};
pub use clock::{Clock, ManualClock, SystemClock};
pub use lens::{QuestionPath, SectionPath, TestPath, VersionPath};
pub use migration::{migrate_legacy_data, LegacyScanner, MigrationReport};
pub use model::Snapshot;
pub use persistence::{
    FileMedium, KeyValueMedium, MemoryMedium, PersistenceAdapter, PersistenceError, SharedMedium,
    StorageKeys,
};
pub use repository::{NewQuestion, NewScoringProfile, NewSection, Repository};
pub use store::{Store, SubscriptionId};
pub use tasks::{spawn_autosave, BackgroundTask};
pub use transfer::{export_data, import_data, ExportEnvelope, ImportOutcome};
