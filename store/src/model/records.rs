use super::{lenient, Extra, Identified};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One student's run through a test version. Scoring fields are opaque and
/// live in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub test_id: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub version_id: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub answers: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub audio_answers: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub violations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A reusable question kept outside any test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBankItem {
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub prompt: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Identified for Attempt {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for QuestionBankItem {
    fn id(&self) -> &str {
        &self.id
    }
}
