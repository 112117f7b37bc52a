//! Conversation history
//!
//! An ordered sequence of `(role, content)` records owned by the agent loop.
//! Individual records are truncated at a configurable character cap so one
//! oversized tool dump cannot swallow the whole context window.

use serde::{Deserialize, Serialize};

/// One conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Who produced the content ("user", "assistant").
    pub role: String,
    /// The record content, possibly truncated.
    pub content: String,
}

/// Ordered conversation history with per-record truncation.
#[derive(Debug, Clone)]
pub struct History {
    records: Vec<HistoryRecord>,
    char_limit: usize,
}

impl History {
    /// Create an empty history with the given per-record character cap.
    pub fn new(char_limit: usize) -> Self {
        Self {
            records: Vec::new(),
            char_limit,
        }
    }

    /// Append a record, truncating the content at the cap.
    pub fn push(&mut self, role: &str, content: &str) {
        let mut content = content.to_string();
        if content.chars().count() > self.char_limit {
            content = content.chars().take(self.char_limit).collect();
            content.push_str("... (truncated)");
        }
        self.records.push(HistoryRecord {
            role: role.to_string(),
            content,
        });
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// The most recent record, if any.
    pub fn last(&self) -> Option<&HistoryRecord> {
        self.records.last()
    }
}
