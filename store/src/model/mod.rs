//! Domain types held by the store.
//!
//! Field names serialize in camelCase to stay readable by older clients that
//! share the same durable medium. Every entity keeps unknown fields in a
//! flattened `extra` map so a load → save cycle never drops data.

mod aggregate;
mod records;
mod scoring;

pub use aggregate::{Assignment, Question, Section, Target, Test, TestStatus, Version};
pub use records::{Attempt, QuestionBankItem};
pub use scoring::{normalize_default_profile, ScoringProfile, SEEDED_PROFILE_ID};

use serde_json::{Map, Value};
use std::sync::Arc;

/// Unknown or type-specific fields carried through untouched.
pub type Extra = Map<String, Value>;

/// Anything addressable by a string id.
pub trait Identified {
    fn id(&self) -> &str;
}

impl<T: Identified> Identified for Arc<T> {
    fn id(&self) -> &str {
        self.as_ref().id()
    }
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Field decoders for documents written by older, loosely typed clients.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};

    /// `null` reads as the field's default.
    pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// Any JSON number, rounded to whole minutes. `null` and negative values
    /// read as zero.
    pub fn whole_minutes<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let minutes = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
        if !minutes.is_finite() || minutes <= 0.0 {
            return Ok(0);
        }
        Ok(minutes.round().min(f64::from(u32::MAX)) as u32)
    }
}

/// Generate a fresh globally unique id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The complete in-memory state: the four top-level collections.
///
/// Tests sit behind `Arc` so a new snapshot shares every untouched test with
/// the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub tests: Vec<Arc<Test>>,
    pub attempts: Vec<Attempt>,
    pub question_bank: Vec<QuestionBankItem>,
    pub scoring_profiles: Vec<ScoringProfile>,
}

impl Snapshot {
    /// An empty snapshot holding only the seeded default scoring profile.
    pub fn seeded(created_at: &str) -> Self {
        Self {
            scoring_profiles: vec![ScoringProfile::seeded(created_at)],
            ..Self::default()
        }
    }

    /// Item counts per collection: tests, attempts, question bank, profiles.
    pub fn counts(&self) -> CollectionCounts {
        CollectionCounts {
            tests: self.tests.len(),
            attempts: self.attempts.len(),
            question_bank: self.question_bank.len(),
            scoring_profiles: self.scoring_profiles.len(),
        }
    }
}

/// Number of items per top-level collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionCounts {
    pub tests: usize,
    pub attempts: usize,
    pub question_bank: usize,
    pub scoring_profiles: usize,
}

impl CollectionCounts {
    pub fn total(&self) -> usize {
        self.tests + self.attempts + self.question_bank + self.scoring_profiles
    }
}
