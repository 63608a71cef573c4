//! JSON export of tests and attempts, and the matching import.

use crate::model::{Attempt, Snapshot, Test};
use crate::persistence::FORMAT_VERSION;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEnvelope {
    pub version: String,
    pub timestamp: String,
    pub data: ExportData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportData {
    pub tests: Vec<Arc<Test>>,
    pub attempts: Vec<Attempt>,
}

/// What an import did, in a form suitable for showing to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub success: bool,
    pub message: String,
}

impl ImportOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

pub fn export_data(store: &Store) -> ExportEnvelope {
    let snapshot = store.snapshot();
    ExportEnvelope {
        version: FORMAT_VERSION.to_string(),
        timestamp: store.clock().now_iso(),
        data: ExportData {
            tests: snapshot.tests.clone(),
            attempts: snapshot.attempts.clone(),
        },
    }
}

/// Replace tests and attempts with the contents of an export document.
///
/// The question bank and scoring profiles are kept. Nothing changes unless
/// `data.tests` and `data.attempts` are both arrays that decode.
pub fn import_data(store: &Store, json: &str) -> ImportOutcome {
    let document: Value = match serde_json::from_str(json) {
        Ok(document) => document,
        Err(e) => return ImportOutcome::failed(format!("Invalid JSON: {}", e)),
    };

    let Some(data) = document.get("data") else {
        return ImportOutcome::failed("Missing 'data' section");
    };
    if !data.get("tests").is_some_and(Value::is_array) {
        return ImportOutcome::failed("'data.tests' must be an array");
    }
    if !data.get("attempts").is_some_and(Value::is_array) {
        return ImportOutcome::failed("'data.attempts' must be an array");
    }

    let data: ExportData = match serde_json::from_value(data.clone()) {
        Ok(data) => data,
        Err(e) => return ImportOutcome::failed(format!("Invalid export data: {}", e)),
    };

    let (tests, attempts) = (data.tests.len(), data.attempts.len());
    let current = store.snapshot();
    store.replace(Snapshot {
        tests: data.tests,
        attempts: data.attempts,
        question_bank: current.question_bank.clone(),
        scoring_profiles: current.scoring_profiles.clone(),
    });
    tracing::info!(tests, attempts, "Imported data");

    ImportOutcome {
        success: true,
        message: format!("Imported {} tests and {} attempts", tests, attempts),
    }
}
