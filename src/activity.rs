use chrono::Local;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogCategory {
    Info,
    Step,
    Success,
    Error,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LogEntry {
    /// Wall-clock time of day, HH:MM:SS.
    pub timestamp: String,
    pub message: String,
    pub category: LogCategory,
}

/// Append-only event list for one generation run. Cleared when a new run
/// starts.
#[derive(Default, Clone, Debug)]
pub struct ActivityLog {
    entries: Vec<LogEntry>,
}

impl ActivityLog {
    pub fn append(&mut self, message: impl Into<String>, category: LogCategory) {
        self.entries.push(LogEntry {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            message: message.into(),
            category,
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
