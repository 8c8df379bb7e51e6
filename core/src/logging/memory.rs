//! In-process logger that keeps every entry in memory.

use std::error::Error as StdError;

use parking_lot::Mutex;

use super::{Level, Logger};

/// One recorded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    pub error: Option<String>,
}

/// Records entries at or above a minimum level.
#[derive(Debug)]
pub struct MemoryLogger {
    minimum: Level,
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new(minimum: Level) -> Self {
        Self {
            minimum,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries rendered as `"LEVEL: message"`.
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|entry| format!("{}: {}", entry.level, entry.message))
            .collect()
    }

    pub fn count(&self, level: Level) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.level == level)
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Logger for MemoryLogger {
    fn is_enabled(&self, level: Level) -> bool {
        level >= self.minimum
    }

    fn log(
        &self,
        level: Level,
        message: &dyn Fn() -> Option<String>,
        error: Option<&(dyn StdError + 'static)>,
    ) {
        if !self.is_enabled(level) {
            return;
        }
        let entry = LogEntry {
            level,
            message: message().unwrap_or_default(),
            error: error.map(ToString::to_string),
        };
        self.entries.lock().push(entry);
    }
}
