//! Bounded in-memory activity log relayed to the control surface.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use namelock_core::current_unix_timestamp_ms;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const ACTIVITY_LOG_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub timestamp_unix_ms: u64,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// RFC 3339 rendering of the entry timestamp.
    pub fn timestamp(&self) -> String {
        i64::try_from(self.timestamp_unix_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|value| value.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default()
    }

    /// One display line: `[timestamp] message`.
    pub fn render(&self) -> String {
        format!("[{}] {}", self.timestamp(), self.message)
    }
}

#[derive(Debug, Default)]
struct ActivityLogBuffer {
    entries: VecDeque<LogEntry>,
    next_sequence: u64,
}

/// FIFO ring buffer of [`LogEntry`] values.
///
/// Every append is mirrored to `tracing` and fanned out to live subscribers.
#[derive(Debug)]
pub struct ActivityLog {
    capacity: usize,
    buffer: Mutex<ActivityLogBuffer>,
    events: broadcast::Sender<LogEntry>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(ACTIVITY_LOG_BROADCAST_CAPACITY);
        Self {
            capacity: capacity.max(1),
            buffer: Mutex::new(ActivityLogBuffer::default()),
            events,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(target: "namelock::activity", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "namelock::activity", "{message}"),
            LogLevel::Error => tracing::error!(target: "namelock::activity", "{message}"),
        }

        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.next_sequence = buffer.next_sequence.saturating_add(1);
        let entry = LogEntry {
            sequence: buffer.next_sequence,
            timestamp_unix_ms: current_unix_timestamp_ms(),
            level,
            message,
        };
        buffer.entries.push_back(entry.clone());
        while buffer.entries.len() > self.capacity {
            buffer.entries.pop_front();
        }
        // Broadcast under the buffer lock so subscribers observe sequence order.
        let _ = self.events.send(entry.clone());
        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.push(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> LogEntry {
        self.push(LogLevel::Warn, message)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.push(LogLevel::Error, message)
    }

    /// Returns up to `limit` most recent entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = buffer.entries.len().saturating_sub(limit);
        buffer.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.events.subscribe()
    }
}
