//! One-time discovery and merge of data left by earlier storage formats.

mod detectors;
mod merge;

pub use detectors::{
    candidate_timestamp, ArrayFieldDetector, Candidate, FieldNameDetector, LegacyCollections,
    LegacyDetector, LegacyScanner, ScanResult, TIMESTAMP_FIELDS,
};
pub use merge::{merge_into, MergeCounts};

use crate::persistence::PersistenceError;
use crate::store::Store;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// The marker was already set; nothing was scanned.
    pub skipped: bool,
    pub scanned: usize,
    pub candidates: usize,
    pub selected_key: Option<String>,
    pub added: MergeCounts,
    /// Legacy fields with no store collection (`users`, `assignments`).
    pub ignored_fields: Vec<String>,
}

/// Scan the medium for legacy data once and merge the most recent candidate.
///
/// The migration marker is written whatever the outcome, so later calls
/// return a skipped report.
pub fn migrate_legacy_data(
    store: &Store,
    scanner: &LegacyScanner,
) -> Result<MigrationReport, PersistenceError> {
    let adapter = store.adapter();
    let keys = adapter.keys();
    let medium = adapter.medium();

    if let Some(done_at) = medium.get(&keys.migration_marker)? {
        info!(done_at = %done_at, "Legacy migration already done, skipping");
        return Ok(MigrationReport {
            skipped: true,
            ..MigrationReport::default()
        });
    }

    info!("Starting legacy data scan");
    let scan = scanner.scan(medium, keys, store.clock().now())?;
    let mut report = MigrationReport {
        scanned: scan.scanned,
        candidates: scan.candidates.len(),
        ..MigrationReport::default()
    };

    if let Some(candidate) = scan.most_recent() {
        if scan.candidates.len() > 1 {
            info!(
                candidates = scan.candidates.len(),
                selected = %candidate.key,
                saved_at = %candidate.saved_at,
                "Several legacy candidates, using the most recent"
            );
        }
        report.selected_key = Some(candidate.key.clone());
        report.ignored_fields = candidate.collections.ignored.clone();

        report.added = store
            .mutate(|snap| {
                let counts = merge_into(snap, &candidate.collections);
                (counts.total() > 0).then_some(counts)
            })
            .unwrap_or_default();
    }

    medium.set(&keys.migration_marker, &store.clock().now_iso())?;

    info!(
        scanned = report.scanned,
        candidates = report.candidates,
        tests = report.added.tests,
        attempts = report.added.attempts,
        question_bank = report.added.question_bank,
        scoring_profiles = report.added.scoring_profiles,
        "Legacy migration completed"
    );
    Ok(report)
}
