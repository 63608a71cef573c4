use super::{empty_object, lenient, Extra, Identified};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Id of the profile seeded into every fresh store. It can never be deleted.
pub const SEEDED_PROFILE_ID: &str = "default-scoring-profile";

/// Grading configuration. The configs are consumed by the grading layer and
/// are opaque here; only `is_default` carries an invariant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoringProfile {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub is_default: bool,
    #[serde(default = "empty_object")]
    pub mcq_config: Value,
    #[serde(default = "empty_object")]
    pub short_config: Value,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub speaking_rubrics: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ScoringProfile {
    /// The profile every store starts with.
    pub fn seeded(created_at: &str) -> Self {
        Self {
            id: SEEDED_PROFILE_ID.to_string(),
            name: "Default".to_string(),
            is_default: true,
            mcq_config: json!({ "pointsPerCorrect": 1, "negativeMarking": false }),
            short_config: json!({ "caseSensitive": false, "trimWhitespace": true }),
            speaking_rubrics: vec![],
            created_at: created_at.to_string(),
            extra: Extra::new(),
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.id == SEEDED_PROFILE_ID
    }
}

impl Identified for ScoringProfile {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Restore the exactly-one-default invariant on a loaded profile list.
///
/// Empty lists get the seeded profile. With no default, the seeded profile
/// (or else the first) is promoted. With several, only the first keeps it.
/// Returns true when anything changed.
pub fn normalize_default_profile(profiles: &mut Vec<ScoringProfile>, created_at: &str) -> bool {
    if profiles.is_empty() {
        profiles.push(ScoringProfile::seeded(created_at));
        return true;
    }

    let default_count = profiles.iter().filter(|p| p.is_default).count();
    match default_count {
        1 => false,
        0 => {
            let promote = profiles
                .iter()
                .position(ScoringProfile::is_seeded)
                .unwrap_or(0);
            profiles[promote].is_default = true;
            true
        }
        _ => {
            let mut seen = false;
            for profile in profiles.iter_mut() {
                if profile.is_default {
                    profile.is_default = !seen;
                    seen = true;
                }
            }
            true
        }
    }
}
