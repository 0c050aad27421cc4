//! Persisted results.
//!
//! Finished sessions are stored as one document per student in the
//! `game_results` collection, merged with whatever the other mini-games wrote
//! there. This module only shapes the rabbit-path part of that document and
//! defines the narrow save interface the store client implements.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::machine::{GameSummary, RoundResult};

/// Document key for a student: trimmed and lower-cased name.
pub fn document_id(student_name: &str) -> String {
    student_name.trim().to_lowercase()
}

/// Rabbit-path section of a student's result document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RabbitPathResult {
    pub score: u32,
    pub total_rounds: usize,
    pub rounds_played: usize,
    pub timestamp: String,
    #[serde(default)]
    pub history: Vec<RoundResult>,
}

/// A student's result document as stored. Sections written by other games
/// are not modelled and are left alone by merge-writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Stored under a snake_case key, unlike the rest of the document.
    #[serde(
        rename = "rabbit_path",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub rabbit_path: Option<RabbitPathResult>,
    pub timestamp: String,
}

impl ResultDocument {
    /// Document for a finished session, stamped with `timestamp`.
    pub fn from_summary(
        student_name: &str,
        class_name: &str,
        summary: GameSummary,
        timestamp: String,
    ) -> Self {
        Self {
            name: student_name.to_owned(),
            class_name: (!class_name.is_empty()).then(|| class_name.to_owned()),
            rabbit_path: Some(RabbitPathResult {
                score: summary.score,
                total_rounds: summary.total_rounds,
                rounds_played: summary.rounds_played,
                timestamp: timestamp.clone(),
                history: summary.history,
            }),
            timestamp,
        }
    }

    pub fn to_json(&self) -> Result<String, SinkError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Current time as an RFC 3339 string with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Receives finished documents. Implementations must not block; failures
/// are reported back only so the caller can log them.
pub trait ResultSink {
    fn save(&self, doc_id: &str, document: &ResultDocument) -> Result<(), SinkError>;
}

/// Keeps saved documents in memory. Useful for tests and offline hosts.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: RefCell<Vec<(String, ResultDocument)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<(String, ResultDocument)> {
        self.saved.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.saved.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.borrow().is_empty()
    }
}

impl ResultSink for MemorySink {
    fn save(&self, doc_id: &str, document: &ResultDocument) -> Result<(), SinkError> {
        self.saved
            .borrow_mut()
            .push((doc_id.to_owned(), document.clone()));
        Ok(())
    }
}
