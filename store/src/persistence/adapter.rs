use super::{PersistenceError, SharedMedium, StorageKeys};
use crate::clock::Clock;
use crate::model::{
    normalize_default_profile, Attempt, QuestionBankItem, ScoringProfile, Snapshot, Test,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Format version written into canonical blobs, backups and exports.
pub const FORMAT_VERSION: &str = "2.0";

/// On-medium shape of a full snapshot: the canonical blob and every backup
/// entry use it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    #[serde(default)]
    pub tests: Vec<Arc<Test>>,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    #[serde(default)]
    pub question_bank: Vec<QuestionBankItem>,
    #[serde(default)]
    pub scoring_profiles: Vec<ScoringProfile>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub saved_at: String,
}

impl StoredSnapshot {
    pub fn capture(snapshot: &Snapshot, saved_at: String) -> Self {
        Self {
            tests: snapshot.tests.clone(),
            attempts: snapshot.attempts.clone(),
            question_bank: snapshot.question_bank.clone(),
            scoring_profiles: snapshot.scoring_profiles.clone(),
            version: FORMAT_VERSION.to_string(),
            saved_at,
        }
    }

    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            tests: self.tests,
            attempts: self.attempts,
            question_bank: self.question_bank,
            scoring_profiles: self.scoring_profiles,
        }
    }
}

/// Reads and writes the canonical snapshot blob, mirroring each collection to
/// its legacy per-collection key for older readers.
pub struct PersistenceAdapter {
    medium: SharedMedium,
    keys: StorageKeys,
    clock: Arc<dyn Clock>,
}

impl PersistenceAdapter {
    pub fn new(medium: SharedMedium, keys: StorageKeys, clock: Arc<dyn Clock>) -> Self {
        Self {
            medium,
            keys,
            clock,
        }
    }

    pub fn medium(&self) -> &SharedMedium {
        &self.medium
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Load the current snapshot.
    ///
    /// Order: canonical key, then the legacy per-collection keys, then a fresh
    /// seeded snapshot. Read failures are logged and fall back to the seeded
    /// snapshot. The result always satisfies the single-default-profile rule.
    pub fn load(&self) -> Snapshot {
        let mut snapshot = match self.load_canonical() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => match self.load_legacy() {
                Ok(Some(snapshot)) => {
                    info!("Assembled snapshot from legacy collection keys");
                    snapshot
                }
                Ok(None) => {
                    info!("No stored data found, starting from defaults");
                    Snapshot::seeded(&self.clock.now_iso())
                }
                Err(e) => {
                    warn!("Failed to read legacy collection keys: {}", e);
                    Snapshot::seeded(&self.clock.now_iso())
                }
            },
            Err(e) => {
                warn!(key = %self.keys.canonical, "Failed to read canonical snapshot: {}", e);
                Snapshot::seeded(&self.clock.now_iso())
            }
        };

        if normalize_default_profile(&mut snapshot.scoring_profiles, &self.clock.now_iso()) {
            info!("Normalized default scoring profile on load");
        }
        snapshot
    }

    fn load_canonical(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let key = &self.keys.canonical;
        let Some(raw) = self.medium.get(key)? else {
            return Ok(None);
        };
        match decode_document(key, &raw) {
            Ok((document, 0)) => Ok(Some(document.into_snapshot())),
            Ok((document, dropped)) => {
                warn!(key = %key, dropped, "Canonical snapshot had unreadable items");
                self.quarantine(&raw);
                Ok(Some(document.into_snapshot()))
            }
            Err(e) => {
                self.quarantine(&raw);
                Err(e)
            }
        }
    }

    /// Keep a raw copy of a canonical blob that could not be fully read, so
    /// the next save does not destroy the only copy.
    fn quarantine(&self, raw: &str) {
        let key = format!("{}{}", self.keys.quarantine_prefix, self.clock.now_iso());
        match self.medium.set(&key, raw) {
            Ok(()) => warn!(key = %key, "Copied unreadable canonical snapshot aside"),
            Err(e) => error!(key = %key, "Failed to copy unreadable canonical snapshot: {}", e),
        }
    }

    /// Assemble a snapshot from whichever legacy collection keys exist.
    /// Returns `None` when none of them is present.
    fn load_legacy(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let tests: Option<Vec<Arc<Test>>> = self.read_collection(&self.keys.legacy_tests)?;
        let attempts: Option<Vec<Attempt>> = self.read_collection(&self.keys.legacy_attempts)?;
        let question_bank: Option<Vec<QuestionBankItem>> =
            self.read_collection(&self.keys.legacy_question_bank)?;
        let scoring_profiles: Option<Vec<ScoringProfile>> =
            self.read_collection(&self.keys.legacy_scoring_profiles)?;

        if tests.is_none()
            && attempts.is_none()
            && question_bank.is_none()
            && scoring_profiles.is_none()
        {
            return Ok(None);
        }

        Ok(Some(Snapshot {
            tests: tests.unwrap_or_default(),
            attempts: attempts.unwrap_or_default(),
            question_bank: question_bank.unwrap_or_default(),
            scoring_profiles: scoring_profiles.unwrap_or_default(),
        }))
    }

    /// Read one legacy collection item by item. A present key that is not a
    /// JSON array is logged and treated as absent.
    fn read_collection<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<Vec<T>>, PersistenceError> {
        let Some(raw) = self.medium.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => Ok(Some(decode_items(&items, key).0)),
            Ok(_) => {
                warn!(key, "Ignoring legacy collection that is not an array");
                Ok(None)
            }
            Err(e) => {
                warn!(key, "Ignoring unparsable legacy collection: {}", e);
                Ok(None)
            }
        }
    }

    /// Write the canonical blob and mirror every collection to its legacy key.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let document = StoredSnapshot::capture(snapshot, self.clock.now_iso());
        let json = serde_json::to_string(&document)?;
        self.medium.set(&self.keys.canonical, &json)?;

        self.medium.set(
            &self.keys.legacy_tests,
            &serde_json::to_string(&document.tests)?,
        )?;
        self.medium.set(
            &self.keys.legacy_attempts,
            &serde_json::to_string(&document.attempts)?,
        )?;
        self.medium.set(
            &self.keys.legacy_question_bank,
            &serde_json::to_string(&document.question_bank)?,
        )?;
        self.medium.set(
            &self.keys.legacy_scoring_profiles,
            &serde_json::to_string(&document.scoring_profiles)?,
        )?;
        Ok(())
    }
}

/// Parse a canonical blob or backup entry.
///
/// Items are decoded one at a time: an item that does not decode is skipped
/// and counted instead of failing the whole document. Returns the document
/// and the number of items dropped. Text that is not a JSON object is
/// `Corrupted`.
pub(crate) fn decode_document(
    key: &str,
    raw: &str,
) -> Result<(StoredSnapshot, usize), PersistenceError> {
    let corrupted = |reason: String| PersistenceError::Corrupted {
        key: key.to_string(),
        reason,
    };
    let root: Value = serde_json::from_str(raw).map_err(|e| corrupted(e.to_string()))?;
    let Value::Object(root) = root else {
        return Err(corrupted("not a JSON object".to_string()));
    };

    let mut dropped = 0;
    let mut collection = |field: &str| -> Vec<Value> {
        match root.get(field) {
            Some(Value::Array(items)) => items.clone(),
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                warn!(key, field, "Collection is not an array, skipping it");
                dropped += 1;
                Vec::new()
            }
        }
    };
    let tests = collection("tests");
    let attempts = collection("attempts");
    let question_bank = collection("questionBank");
    let scoring_profiles = collection("scoringProfiles");

    let text = |field: &str| {
        root.get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let (tests, a) = decode_items(&tests, "tests");
    let (attempts, b) = decode_items(&attempts, "attempts");
    let (question_bank, c) = decode_items(&question_bank, "questionBank");
    let (scoring_profiles, d) = decode_items(&scoring_profiles, "scoringProfiles");

    let document = StoredSnapshot {
        tests,
        attempts,
        question_bank,
        scoring_profiles,
        version: text("version"),
        saved_at: text("savedAt"),
    };
    Ok((document, dropped + a + b + c + d))
}

/// Decode each item on its own, skipping the ones that fail.
fn decode_items<T: DeserializeOwned>(items: &[Value], collection: &str) -> (Vec<T>, usize) {
    let mut decoded = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in items {
        match T::deserialize(item) {
            Ok(value) => decoded.push(value),
            Err(e) => {
                warn!(collection, "Skipping undecodable item: {}", e);
                dropped += 1;
            }
        }
    }
    (decoded, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{Extra, TestStatus, SEEDED_PROFILE_ID};
    use crate::persistence::{KeyValueMedium, MemoryMedium};
    use serde_json::{json, Value};

    fn adapter_with(medium: Arc<MemoryMedium>) -> PersistenceAdapter {
        PersistenceAdapter::new(
            medium,
            StorageKeys::default(),
            Arc::new(ManualClock::at_millis(1_700_000_000_000)),
        )
    }

    fn sample_test(id: &str) -> Arc<Test> {
        Arc::new(Test {
            id: id.to_string(),
            name: format!("Test {id}"),
            description: String::new(),
            status: TestStatus::Draft,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            updated_at: None,
            versions: vec![],
            assignments: vec![],
            extra: Extra::new(),
        })
    }

    fn strip_saved_at(raw: &str) -> Value {
        let mut value: Value = serde_json::from_str(raw).unwrap();
        value.as_object_mut().unwrap().remove("savedAt");
        value
    }

    #[test]
    fn test_load_empty_medium_seeds_default_profile() {
        let adapter = adapter_with(Arc::new(MemoryMedium::new()));
        let snapshot = adapter.load();
        assert!(snapshot.tests.is_empty());
        assert_eq!(snapshot.scoring_profiles.len(), 1);
        assert_eq!(snapshot.scoring_profiles[0].id, SEEDED_PROFILE_ID);
        assert!(snapshot.scoring_profiles[0].is_default);
    }

    #[test]
    fn test_save_writes_canonical_and_legacy_mirrors() {
        let medium = Arc::new(MemoryMedium::new());
        let adapter = adapter_with(medium.clone());
        let mut snapshot = adapter.load();
        snapshot.tests.push(sample_test("t1"));
        adapter.save(&snapshot).unwrap();

        let canonical: Value =
            serde_json::from_str(&medium.get("exam_data").unwrap().unwrap()).unwrap();
        assert_eq!(canonical["version"], json!(FORMAT_VERSION));
        assert_eq!(canonical["savedAt"], json!("2023-11-14T22:13:20.000Z"));
        assert_eq!(canonical["tests"][0]["id"], json!("t1"));

        let mirrored: Value =
            serde_json::from_str(&medium.get("exam_tests").unwrap().unwrap()).unwrap();
        assert_eq!(mirrored[0]["id"], json!("t1"));
        assert!(medium.get("exam_scoring_profiles").unwrap().is_some());
    }

    #[test]
    fn test_save_load_is_idempotent() {
        let medium = Arc::new(MemoryMedium::new());
        let adapter = adapter_with(medium.clone());
        let mut snapshot = adapter.load();
        snapshot.tests.push(sample_test("t1"));
        adapter.save(&snapshot).unwrap();
        let first = medium.get("exam_data").unwrap().unwrap();

        let reloaded = adapter.load();
        adapter.save(&reloaded).unwrap();
        let second = medium.get("exam_data").unwrap().unwrap();

        assert_eq!(reloaded, snapshot);
        assert_eq!(strip_saved_at(&first), strip_saved_at(&second));
    }

    #[test]
    fn test_load_assembles_from_legacy_keys() {
        let medium = Arc::new(MemoryMedium::new());
        medium
            .set(
                "exam_tests",
                &json!([{"id": "old-1", "name": "Old quiz"}]).to_string(),
            )
            .unwrap();
        let adapter = adapter_with(medium);
        let snapshot = adapter.load();
        assert_eq!(snapshot.tests.len(), 1);
        assert_eq!(snapshot.tests[0].id, "old-1");
        // Missing profile key still yields a seeded default.
        assert_eq!(snapshot.scoring_profiles.len(), 1);
    }

    #[test]
    fn test_corrupted_canonical_falls_back_to_defaults() {
        let medium = Arc::new(MemoryMedium::new());
        medium.set("exam_data", "{not json").unwrap();
        let adapter = adapter_with(medium.clone());
        let snapshot = adapter.load();
        assert!(snapshot.tests.is_empty());
        assert_eq!(snapshot.scoring_profiles.len(), 1);

        // The unreadable blob survives the next save.
        adapter.save(&snapshot).unwrap();
        let copy = medium
            .get("exam_quarantine_2023-11-14T22:13:20.000Z")
            .unwrap()
            .unwrap();
        assert_eq!(copy, "{not json");
    }

    #[test]
    fn test_loosely_typed_canonical_keeps_every_test() {
        let medium = Arc::new(MemoryMedium::new());
        medium
            .set(
                "exam_data",
                &json!({
                    "tests": [
                        {"id": "t1", "name": "Quiz 1", "description": null},
                        {"id": "t2", "name": "Quiz 2", "versions": [{
                            "id": "v1",
                            "sections": [{"id": "s1", "timeLimit": 30.5}]
                        }]}
                    ],
                    "version": "2.0",
                    "savedAt": "2024-01-01T00:00:00.000Z"
                })
                .to_string(),
            )
            .unwrap();
        let adapter = adapter_with(medium.clone());
        let snapshot = adapter.load();

        let ids: Vec<_> = snapshot.tests.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
        assert_eq!(snapshot.tests[1].versions[0].sections[0].time_limit, 31);
        // Nothing was dropped, so nothing is copied aside.
        let keys = medium.keys().unwrap();
        assert!(!keys.iter().any(|k| k.starts_with("exam_quarantine_")));

        adapter.save(&snapshot).unwrap();
        let canonical: Value =
            serde_json::from_str(&medium.get("exam_data").unwrap().unwrap()).unwrap();
        assert_eq!(canonical["tests"][0]["description"], json!(""));
        assert_eq!(canonical["tests"][1]["id"], json!("t2"));
    }

    #[test]
    fn test_undecodable_item_is_dropped_and_blob_copied_aside() {
        let medium = Arc::new(MemoryMedium::new());
        let raw = json!({
            "tests": [{"id": "t1", "name": "Kept"}, {"name": "No id"}, 42],
            "attempts": [{"id": "a1", "testId": "t1"}]
        })
        .to_string();
        medium.set("exam_data", &raw).unwrap();
        let adapter = adapter_with(medium.clone());
        let snapshot = adapter.load();

        assert_eq!(snapshot.tests.len(), 1);
        assert_eq!(snapshot.tests[0].name, "Kept");
        assert_eq!(snapshot.attempts.len(), 1);
        let copy = medium
            .get("exam_quarantine_2023-11-14T22:13:20.000Z")
            .unwrap();
        assert_eq!(copy.as_deref(), Some(raw.as_str()));
    }

    #[test]
    fn test_decode_document_rejects_non_object() {
        let err = decode_document("exam_data", "[1, 2]").unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupted { ref key, .. } if key == "exam_data"));
    }

    #[test]
    fn test_save_reports_quota_failure() {
        let medium = Arc::new(MemoryMedium::with_quota(64));
        let adapter = adapter_with(medium);
        let mut snapshot = adapter.load();
        snapshot.tests.push(sample_test("t1"));
        let err = adapter.save(&snapshot).unwrap_err();
        assert!(matches!(err, PersistenceError::QuotaExceeded { .. }));
    }
}
