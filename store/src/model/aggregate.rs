use super::{empty_object, lenient, Extra, Identified};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Publication state of a test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    #[default]
    Draft,
    Published,
}

/// A test document: the root of the test → version → section → question
/// aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub status: TestStatus,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub versions: Vec<Arc<Version>>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub assignments: Vec<Assignment>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Audience a version is written for, e.g. `{system: "KR", grades: ["중1"]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub system: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub grades: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub targets: Vec<Target>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub sections: Vec<Arc<Section>>,
    #[serde(default = "empty_object")]
    pub exam_options: Value,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub label: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::null_as_default")]
    pub kind: String,
    /// Minutes.
    #[serde(default, deserialize_with = "lenient::whole_minutes")]
    pub time_limit: u32,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub questions: Vec<Arc<Question>>,
    #[serde(default = "empty_object")]
    pub settings: Value,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A question. Type-specific fields (audio prompts, rubrics, passage ids...)
/// travel untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub points: f64,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A deployment of a test to some audience.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub assigned_at: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Identified for Test {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Version {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Section {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Question {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Assignment {
    fn id(&self) -> &str {
        &self.id
    }
}
