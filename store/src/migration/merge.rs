//! Conservative id-union merge of legacy collections into a snapshot.

use super::detectors::LegacyCollections;
use crate::model::{Identified, Snapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Items appended per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCounts {
    pub tests: usize,
    pub attempts: usize,
    pub question_bank: usize,
    pub scoring_profiles: usize,
}

impl MergeCounts {
    pub fn total(&self) -> usize {
        self.tests + self.attempts + self.question_bank + self.scoring_profiles
    }
}

/// Append legacy items whose id is not already present. Existing items are
/// never modified. Appended scoring profiles are never default.
pub fn merge_into(snapshot: &mut Snapshot, legacy: &LegacyCollections) -> MergeCounts {
    MergeCounts {
        tests: union_into(&mut snapshot.tests, &legacy.tests, "tests", |_| {}),
        attempts: union_into(&mut snapshot.attempts, &legacy.attempts, "attempts", |_| {}),
        question_bank: union_into(
            &mut snapshot.question_bank,
            &legacy.question_bank,
            "questionBank",
            |_| {},
        ),
        scoring_profiles: union_into(
            &mut snapshot.scoring_profiles,
            &legacy.scoring_profiles,
            "scoringProfiles",
            |profile| profile.is_default = false,
        ),
    }
}

fn union_into<T: DeserializeOwned + Identified>(
    current: &mut Vec<T>,
    legacy: &[Value],
    collection: &str,
    mut prepare: impl FnMut(&mut T),
) -> usize {
    let mut seen: HashSet<String> = current.iter().map(|item| item.id().to_string()).collect();
    let mut added = 0;

    for raw in legacy {
        let mut item: T = match serde_json::from_value(raw.clone()) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(collection, "Skipping undecodable legacy item: {}", e);
                continue;
            }
        };
        if item.id().is_empty() || !seen.insert(item.id().to_string()) {
            continue;
        }
        prepare(&mut item);
        current.push(item);
        added += 1;
    }
    added
}
