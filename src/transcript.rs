//! Persisted chat transcript.
//!
//! The transcript always starts with the assistant greeting when empty and
//! never holds more than its configured limit; older messages are dropped
//! first.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::models::{ChatMessage, Role};

pub const GREETING: &str = "مرحباً! أنا مساعدك الذكي في الكلية. كيف يمكنني مساعدتك اليوم؟";

pub struct Transcript {
    path: Option<PathBuf>,
    limit: usize,
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn in_memory(limit: usize, now: DateTime<Utc>) -> Self {
        let mut transcript = Self {
            path: None,
            limit: limit.max(1),
            messages: Vec::new(),
        };
        transcript.seed(now);
        transcript
    }

    /// Load the transcript at `path`. An unreadable file is logged and
    /// treated as empty.
    pub fn open(path: impl Into<PathBuf>, limit: usize, now: DateTime<Utc>) -> Self {
        let path = path.into();
        let messages = match read_messages(&path) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not load transcript");
                Vec::new()
            }
        };

        let mut transcript = Self {
            path: Some(path),
            limit: limit.max(1),
            messages,
        };
        transcript.trim();
        if transcript.messages.is_empty() {
            transcript.seed(now);
        }
        transcript
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Append a message, dropping the oldest beyond the limit.
    pub fn push(&mut self, role: Role, text: &str, now: DateTime<Utc>) {
        self.messages.push(new_message(role, text, now));
        self.trim();
    }

    pub fn save(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.messages)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write transcript: {}", path.display()))?;
        Ok(())
    }

    /// Forget every message and start over from the greeting.
    pub fn clear(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.messages.clear();
        self.seed(now);
        self.save()
    }

    fn seed(&mut self, now: DateTime<Utc>) {
        self.messages.push(new_message(Role::Assistant, GREETING, now));
    }

    fn trim(&mut self) {
        if self.messages.len() > self.limit {
            let excess = self.messages.len() - self.limit;
            self.messages.drain(..excess);
        }
    }
}

fn new_message(role: Role, text: &str, now: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4().to_string(),
        role,
        text: text.to_string(),
        timestamp: now,
    }
}

fn read_messages(path: &Path) -> Result<Vec<ChatMessage>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
    let messages = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse transcript: {}", path.display()))?;
    Ok(messages)
}
