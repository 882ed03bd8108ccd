//! Audit trail for authentication and administrative events.
//!
//! Entries are kept in a bounded in-memory ring and forwarded to any number
//! of sinks. Nothing recorded here carries embeddings or tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Retained entries when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub actor: String,
    pub target: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Face login, successful or not
    LoginAttempt,
    Registration { role: String },
    Logout { session_id: String },
    /// A presented credential failed validation
    SessionRejected { reason: String },
    IdentityPurge,
    CollectionCleared { collection: String },
    DocumentIngested { collection: String, passages: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

pub struct AuditLogger {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("capacity", &self.capacity)
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: DEFAULT_CAPACITY,
            sinks,
        }
    }

    /// Logger that forwards every entry to `tracing`.
    pub fn tracing() -> Self {
        Self::with_sinks(vec![Box::new(TracingSink)])
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn log(&self, event: AuditEvent, actor: &str, target: &str, outcome: AuditOutcome, details: Option<String>) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            target: target.into(),
            outcome,
            details,
        };

        {
            let mut entries = self.lock();
            if entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn entries_by_outcome(&self, outcome: &AuditOutcome) -> Vec<AuditEntry> {
        self.lock().iter().filter(|e| &e.outcome == outcome).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            event = ?entry.event,
            actor = %entry.actor,
            target = %entry.target,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}
