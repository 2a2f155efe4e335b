//! Bounded ring of categorized diagnostic entries, served read-only over
//! `/api/logs`. Every entry is also mirrored to the `log` facade so the
//! console sink sees what the dashboard sees.

use std::mem::MaybeUninit;

use chrono::{DateTime, Utc};
use ringbuf::{LocalRb, Rb};
use serde::{Deserialize, Serialize};

use super::walltime;

/// Roughly 200 bytes per entry keeps the whole ring around 10KB, which is
/// what the legacy firmware budgeted for its log list.
pub const DEFAULT_LOG_CAPACITY: usize = 50;

pub const DEFAULT_QUERY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Sensor,
    Network,
    Cloud,
    System,
    General,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Network => "network",
            Self::Cloud => "cloud",
            Self::System => "system",
            Self::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    fn facade_level(&self) -> log::Level {
        match self {
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub category: LogCategory,
    pub level: LogLevel,
    pub message: String,
}

/// Conjunctive filter: category-set membership AND level-set membership
/// AND case-insensitive substring over message/timestamp. `None` means
/// "no constraint" for that axis.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub categories: Option<Vec<LogCategory>>,
    pub levels: Option<Vec<LogLevel>>,
    pub search: Option<String>,
    pub limit: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            categories: None,
            levels: None,
            search: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl LogQuery {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(categories) = &self.categories {
            if !categories.contains(&entry.category) {
                return false;
            }
        }
        if let Some(levels) = &self.levels {
            if !levels.contains(&entry.level) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !entry.message.to_lowercase().contains(&needle)
                && !entry.timestamp.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// Query output: the truncated page plus the pre-truncation match count
/// (the `/api/logs` response reports both).
#[derive(Debug, Clone)]
pub struct LogQueryResult {
    pub entries: Vec<LogEntry>,
    pub matched: usize,
}

type LogRb = LocalRb<LogEntry, Vec<MaybeUninit<LogEntry>>>;

pub struct EventLog {
    ring: LogRb,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: LocalRb::new(capacity.max(1)),
        }
    }

    pub fn total(&self) -> usize {
        self.ring.len()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn push(
        &mut self,
        category: LogCategory,
        level: LogLevel,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let message = message.into();
        log::log!(
            level.facade_level(),
            "[{}] {}",
            category.as_str(),
            message
        );
        self.ring.push_overwrite(LogEntry {
            timestamp: walltime::format_civil(now),
            category,
            level,
            message,
        });
    }

    /// Matching entries newest first, truncated to the query limit.
    pub fn query(&self, query: &LogQuery) -> LogQueryResult {
        let mut entries: Vec<LogEntry> = self
            .ring
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        entries.reverse();
        let matched = entries.len();
        entries.truncate(query.limit);
        LogQueryResult { entries, matched }
    }

    /// Distinct categories present, oldest-seen first.
    pub fn categories(&self) -> Vec<LogCategory> {
        let mut seen = Vec::new();
        for entry in self.ring.iter() {
            if !seen.contains(&entry.category) {
                seen.push(entry.category);
            }
        }
        seen
    }

    /// Distinct levels present, oldest-seen first.
    pub fn levels(&self) -> Vec<LogLevel> {
        let mut seen = Vec::new();
        for entry in self.ring.iter() {
            if !seen.contains(&entry.level) {
                seen.push(entry.level);
            }
        }
        seen
    }
}
