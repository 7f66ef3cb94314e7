use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Default maximum number of activity entries to keep in memory
pub const DEFAULT_MAX_LOG_LINES: usize = 10000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    pub task_id: Option<String>,
}

struct Inner {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

/// Bounded, in-memory record of what the client did on behalf of the user.
///
/// Every entry is also forwarded to the `log` facade, so swallowed polling
/// errors still reach whatever logger the host installed.
pub struct ActivityLog {
    inner: Mutex<Inner>,
    max_lines: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl ActivityLog {
    pub fn new(max_lines: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(max_lines.min(1024)),
                next_id: 0,
            }),
            max_lines,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the deque inconsistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, level: LogLevel, message: &str, task_id: Option<&str>) {
        match task_id {
            Some(id) => log::log!(level.as_log_level(), "[task {id}] {message}"),
            None => log::log!(level.as_log_level(), "{message}"),
        }

        let mut inner = self.lock();
        let entry = LogEntry {
            id: inner.next_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.to_string(),
            task_id: task_id.map(str::to_string),
        };
        inner.next_id += 1;
        inner.entries.push_back(entry);

        while inner.entries.len() > self.max_lines {
            inner.entries.pop_front();
        }
    }

    pub fn info(&self, message: &str, task_id: Option<&str>) {
        self.record(LogLevel::Info, message, task_id);
    }

    pub fn warn(&self, message: &str, task_id: Option<&str>) {
        self.record(LogLevel::Warning, message, task_id);
    }

    pub fn error(&self, message: &str, task_id: Option<&str>) {
        self.record(LogLevel::Error, message, task_id);
    }

    pub fn entries(&self, task_id: Option<&str>) -> Vec<LogEntry> {
        let inner = self.lock();
        match task_id {
            Some(id) => inner
                .entries
                .iter()
                .filter(|e| e.task_id.as_deref() == Some(id))
                .cloned()
                .collect(),
            None => inner.entries.iter().cloned().collect(),
        }
    }

    pub fn entries_paginated(&self, task_id: Option<&str>, offset: usize, limit: usize) -> Vec<LogEntry> {
        let inner = self.lock();
        inner
            .entries
            .iter()
            .filter(|e| task_id.is_none() || e.task_id.as_deref() == task_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
