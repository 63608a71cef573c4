//! Heuristics that decide whether a stored entry holds data from an earlier
//! storage format, and pull its collections out.

use crate::clock::parse_timestamp;
use crate::persistence::{PersistenceError, SharedMedium, StorageKeys};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::sync::OnceLock;

/// Fields checked, in this order, for a candidate's save time.
pub const TIMESTAMP_FIELDS: [&str; 6] = [
    "savedAt",
    "updatedAt",
    "lastModified",
    "timestamp",
    "createdAt",
    "date",
];

fn collection_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(users|tests|assignments|attempts|question_?bank|scoring_?profiles)$")
            .expect("collection field pattern is valid")
    })
}

/// Collections pulled out of a legacy document. Items are still raw JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyCollections {
    pub tests: Vec<Value>,
    pub attempts: Vec<Value>,
    pub question_bank: Vec<Value>,
    pub scoring_profiles: Vec<Value>,
    /// Recognised fields with no counterpart in the store.
    pub ignored: Vec<String>,
}

impl LegacyCollections {
    /// Map top-level fields onto store collections by name, ignoring case
    /// and underscores.
    pub fn from_document(document: &Map<String, Value>) -> Self {
        let mut collections = Self::default();
        for (field, value) in document {
            let Value::Array(items) = value else {
                continue;
            };
            let normalized = field.replace('_', "").to_ascii_lowercase();
            let target = match normalized.as_str() {
                "tests" => &mut collections.tests,
                "attempts" => &mut collections.attempts,
                "questionbank" => &mut collections.question_bank,
                "scoringprofiles" => &mut collections.scoring_profiles,
                "users" | "assignments" => {
                    if !items.is_empty() {
                        collections.ignored.push(field.clone());
                    }
                    continue;
                }
                _ => continue,
            };
            target.extend(items.iter().cloned());
        }
        collections
    }
}

/// Decides whether a parsed entry looks like legacy data.
pub trait LegacyDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, key: &str, document: &Map<String, Value>) -> bool;

    fn extract(&self, document: &Map<String, Value>) -> LegacyCollections {
        LegacyCollections::from_document(document)
    }
}

/// Matches documents with a top-level field named like a known collection.
#[derive(Debug, Default)]
pub struct FieldNameDetector;

impl LegacyDetector for FieldNameDetector {
    fn name(&self) -> &'static str {
        "field-name"
    }

    fn matches(&self, _key: &str, document: &Map<String, Value>) -> bool {
        document
            .keys()
            .any(|field| collection_field_regex().is_match(field))
    }
}

/// Matches documents with any non-empty top-level array.
#[derive(Debug, Default)]
pub struct ArrayFieldDetector;

impl LegacyDetector for ArrayFieldDetector {
    fn name(&self) -> &'static str {
        "array-field"
    }

    fn matches(&self, _key: &str, document: &Map<String, Value>) -> bool {
        has_non_empty_array(document)
    }
}

fn has_non_empty_array(document: &Map<String, Value>) -> bool {
    document
        .values()
        .any(|v| v.as_array().is_some_and(|items| !items.is_empty()))
}

/// A valid legacy entry found during a scan.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub key: String,
    pub detector: &'static str,
    pub saved_at: DateTime<Utc>,
    pub collections: LegacyCollections,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    /// Entries examined, bookkeeping keys excluded.
    pub scanned: usize,
    pub candidates: Vec<Candidate>,
}

impl ScanResult {
    /// The most recent candidate. Ties go to the lexically first key.
    pub fn most_recent(&self) -> Option<&Candidate> {
        self.candidates
            .iter()
            .max_by_key(|c| (c.saved_at, Reverse(c.key.clone())))
    }
}

/// Walks the medium and runs each entry past an ordered detector list.
pub struct LegacyScanner {
    detectors: Vec<Box<dyn LegacyDetector>>,
}

impl Default for LegacyScanner {
    fn default() -> Self {
        Self::empty()
            .with_detector(FieldNameDetector)
            .with_detector(ArrayFieldDetector)
    }
}

impl LegacyScanner {
    /// A scanner with no detectors; nothing will match.
    pub fn empty() -> Self {
        Self { detectors: vec![] }
    }

    pub fn with_detector(mut self, detector: impl LegacyDetector + 'static) -> Self {
        self.detectors.push(Box::new(detector));
        self
    }

    /// Examine every non-bookkeeping key. Unparsable or non-object entries
    /// are skipped, as are matches without any non-empty array.
    pub fn scan(
        &self,
        medium: &SharedMedium,
        keys: &StorageKeys,
        now: DateTime<Utc>,
    ) -> Result<ScanResult, PersistenceError> {
        let mut result = ScanResult::default();

        for key in medium.keys()? {
            if keys.is_bookkeeping(&key) {
                continue;
            }
            result.scanned += 1;

            let Some(raw) = medium.get(&key)? else {
                continue;
            };
            let Ok(Value::Object(document)) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };
            let Some(detector) = self.detectors.iter().find(|d| d.matches(&key, &document)) else {
                continue;
            };
            if !has_non_empty_array(&document) {
                tracing::debug!(key = %key, detector = detector.name(), "Legacy match has no data, ignoring");
                continue;
            }

            let saved_at = candidate_timestamp(&document).unwrap_or(now);
            tracing::debug!(key = %key, detector = detector.name(), %saved_at, "Found legacy candidate");
            result.candidates.push(Candidate {
                key,
                detector: detector.name(),
                saved_at,
                collections: detector.extract(&document),
            });
        }
        Ok(result)
    }
}

/// Latest timestamp at the document root, or failing that, inside the items
/// of its top-level arrays.
pub fn candidate_timestamp(document: &Map<String, Value>) -> Option<DateTime<Utc>> {
    latest_in(document).or_else(|| {
        document
            .values()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(Value::as_object)
            .filter_map(latest_in)
            .max()
    })
}

fn latest_in(object: &Map<String, Value>) -> Option<DateTime<Utc>> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|field| object.get(*field))
        .filter_map(timestamp_value)
        .max()
}

fn timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{KeyValueMedium, MemoryMedium};
    use serde_json::json;
    use std::sync::Arc;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn medium_with(entries: &[(&str, Value)]) -> SharedMedium {
        let medium = MemoryMedium::new();
        for (key, value) in entries {
            medium.set(key, &value.to_string()).unwrap();
        }
        Arc::new(medium)
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_field_name_patterns() {
        let detector = FieldNameDetector;
        assert!(detector.matches("k", &object(json!({"questionBank": []}))));
        assert!(detector.matches("k", &object(json!({"scoring_profiles": []}))));
        assert!(detector.matches("k", &object(json!({"USERS": 1}))));
        assert!(!detector.matches("k", &object(json!({"contests": []}))));
    }

    #[test]
    fn test_extract_maps_fields_and_reports_ignored() {
        let doc = object(json!({
            "Tests": [{"id": "t1"}],
            "question_bank": [{"id": "b1"}],
            "users": [{"id": "u1"}],
            "assignments": [],
            "other": [1, 2]
        }));
        let collections = LegacyCollections::from_document(&doc);
        assert_eq!(collections.tests.len(), 1);
        assert_eq!(collections.question_bank.len(), 1);
        assert!(collections.attempts.is_empty());
        assert_eq!(collections.ignored, vec!["users"]);
    }

    #[test]
    fn test_timestamp_root_before_items() {
        let doc = object(json!({
            "savedAt": "2024-01-01T00:00:00.000Z",
            "tests": [{"id": "t1", "updatedAt": "2025-01-01T00:00:00.000Z"}]
        }));
        assert_eq!(
            candidate_timestamp(&doc),
            parse_timestamp("2024-01-01T00:00:00.000Z")
        );

        let items_only = object(json!({
            "tests": [
                {"id": "t1", "createdAt": "2024-05-01T00:00:00Z"},
                {"id": "t2", "updatedAt": 1_717_200_000_000_i64}
            ]
        }));
        assert_eq!(
            candidate_timestamp(&items_only),
            Utc.timestamp_millis_opt(1_717_200_000_000).single()
        );
        assert!(candidate_timestamp(&object(json!({"tests": [1]}))).is_none());
    }

    #[test]
    fn test_scan_skips_bookkeeping_and_invalid() {
        let medium = medium_with(&[
            ("exam_data", json!({"tests": [{"id": "current"}]})),
            ("exam_backup_2024-01-01T00:00:00.000Z", json!({"tests": [{"id": "b"}]})),
            ("exam_tests", json!([{"id": "mirror"}])),
            ("empty", json!({"tests": []})),
            ("settings", json!({"theme": "dark"})),
            ("legacy", json!({"tests": [{"id": "old"}]})),
        ]);
        let result = LegacyScanner::default()
            .scan(&medium, &StorageKeys::default(), now())
            .unwrap();

        assert_eq!(result.scanned, 4);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].key, "legacy");
        assert_eq!(result.candidates[0].detector, "field-name");
        assert_eq!(result.candidates[0].saved_at, now());
    }

    #[test]
    fn test_array_detector_catches_unnamed_collections() {
        let medium = medium_with(&[("blob", json!({"items": [{"id": "x"}]}))]);
        let result = LegacyScanner::default()
            .scan(&medium, &StorageKeys::default(), now())
            .unwrap();
        assert_eq!(result.candidates[0].detector, "array-field");

        let none = LegacyScanner::empty()
            .scan(&medium, &StorageKeys::default(), now())
            .unwrap();
        assert!(none.candidates.is_empty());
    }

    #[test]
    fn test_most_recent_tie_prefers_first_key() {
        let medium = medium_with(&[
            ("b_state", json!({"savedAt": "2024-01-01T00:00:00Z", "tests": [{"id": "1"}]})),
            ("a_state", json!({"savedAt": "2024-01-01T00:00:00Z", "tests": [{"id": "2"}]})),
            ("c_state", json!({"savedAt": "2023-01-01T00:00:00Z", "tests": [{"id": "3"}]})),
        ]);
        let result = LegacyScanner::default()
            .scan(&medium, &StorageKeys::default(), now())
            .unwrap();
        assert_eq!(result.most_recent().unwrap().key, "a_state");
    }
}
