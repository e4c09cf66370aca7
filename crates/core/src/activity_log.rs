//! User-visible activity log
//!
//! A bounded FIFO of lifecycle events shown by the control surface. The
//! newest entry is appended and then the oldest are trimmed, so at most
//! [`LOG_CAPACITY`] entries are ever retained. Insertion order is the only
//! order; there is no deduplication.
//!
//! Every append is mirrored to `tracing` so diagnostics see the same events.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Maximum number of retained entries
pub const LOG_CAPACITY: usize = 80;

/// Capacity of the live-update channel
const SUBSCRIBER_BUFFER: usize = 128;

/// Kind of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Lifecycle progress emitted by the system
    Sys,
    /// Neutral information
    Info,
    /// A step completed successfully
    Ok,
    /// A failure
    Err,
}

impl LogKind {
    /// Short tag used in rendered output
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Sys => "sys",
            LogKind::Info => "info",
            LogKind::Ok => "ok",
            LogKind::Err => "err",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was appended
    pub timestamp: DateTime<Local>,
    /// Human-readable message
    pub message: String,
    /// Entry kind
    pub kind: LogKind,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.message
        )
    }
}

/// Bounded, append-ordered, cheaply cloneable activity log
#[derive(Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    updates: broadcast::Sender<LogEntry>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    /// Empty log
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(LOG_CAPACITY + 1))),
            updates,
        }
    }

    /// Append an entry, evicting the oldest beyond [`LOG_CAPACITY`]
    pub fn append(&self, message: impl Into<String>, kind: LogKind) {
        let entry = LogEntry {
            timestamp: Local::now(),
            message: message.into(),
            kind,
        };

        match kind {
            LogKind::Err => error!(kind = %kind, "{}", entry.message),
            _ => info!(kind = %kind, "{}", entry.message),
        }

        // The lock covers push and broadcast so subscribers observe
        // entries in the same order as the snapshot.
        let mut entries = self.entries.lock();
        entries.push_back(entry.clone());
        while entries.len() > LOG_CAPACITY {
            entries.pop_front();
        }
        let _ = self.updates.send(entry);
    }

    /// Copy of the retained entries, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is retained
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Most recent entry
    pub fn last(&self) -> Option<LogEntry> {
        self.entries.lock().back().cloned()
    }

    /// Live feed of entries appended after this call
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.updates.subscribe()
    }
}

impl fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityLog")
            .field("len", &self.len())
            .finish()
    }
}
