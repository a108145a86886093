//! Append-only activity log shown in the log panel

use chrono::{DateTime, Utc};
use ingest_common::events::LogSeverity;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: LogSeverity,
    pub message: String,
    pub file_name: Option<String>,
}

/// Time-ordered record of human-readable events
///
/// Entries keep the order they were appended in. With a non-zero capacity
/// the oldest entries are evicted once the log is full.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityLogEntry>,
    capacity: usize,
    evicted: u64,
}

impl ActivityLog {
    /// `capacity == 0` means unbounded
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            evicted: 0,
        }
    }

    pub fn append(
        &mut self,
        severity: LogSeverity,
        message: impl Into<String>,
        file_name: Option<&str>,
    ) -> ActivityLogEntry {
        let entry = ActivityLogEntry {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            file_name: file_name.map(str::to_string),
        };

        if self.capacity > 0 && self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry.clone());
        entry
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivityLogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<ActivityLogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped because of the capacity limit
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_preserved() {
        let mut log = ActivityLog::new(0);
        for i in 0..50 {
            log.append(LogSeverity::Info, format!("entry {}", i), None);
        }
        let messages: Vec<_> = log.entries().map(|e| e.message.clone()).collect();
        assert_eq!(messages.len(), 50);
        assert_eq!(messages[0], "entry 0");
        assert_eq!(messages[49], "entry 49");
        assert!(log.entries().zip(log.entries().skip(1)).all(|(a, b)| a.timestamp <= b.timestamp));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = ActivityLog::new(3);
        for i in 0..5 {
            log.append(LogSeverity::Success, format!("entry {}", i), Some("a.pdf"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.evicted(), 2);
        assert_eq!(log.to_vec()[0].message, "entry 2");
        assert_eq!(log.to_vec()[2].file_name.as_deref(), Some("a.pdf"));
    }
}
