//! Core data models shared by the store, the chat pipeline, and the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scheduled class session from the timetable.
///
/// Every field is free text as entered by staff; a blank string means the
/// value was never filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lecture {
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub lecture_time: String,
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub lecture_title: String,
    #[serde(default)]
    pub instructor: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub study_type: String,
}

impl Lecture {
    /// Lowercased text searched by the free-text scorer.
    pub fn haystack(&self) -> String {
        [
            &self.department,
            &self.lecture_title,
            &self.instructor,
            &self.room,
            &self.day,
            &self.level,
            &self.lecture_time,
        ]
        .iter()
        .map(|f| f.as_str())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in the persisted chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A free-text knowledge document stored with its embedding.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// A knowledge document ranked against a query.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMatch {
    pub id: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub score: f64,
}
