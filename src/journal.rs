//! Append-only journal seam
//!
//! Structured lifecycle and result events are written through this interface
//! and correlated by `run_id`/`cycle_id`. The durable backing (database,
//! object store) is an external collaborator; this crate ships an in-memory
//! implementation for tests and audit inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

/// A single journaled event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEvent {
    /// Event kind, e.g. "cycle_started", "revenue_logged"
    pub kind: String,
    /// Correlation ID for the run that produced this event
    pub run_id: Option<String>,
    /// Cycle this event belongs to, for scheduled runs
    pub cycle_id: Option<String>,
    /// Structured payload
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl JournalEvent {
    pub fn new(kind: &str, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            run_id: None,
            cycle_id: None,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_run(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn with_cycle(mut self, cycle_id: &str) -> Self {
        self.cycle_id = Some(cycle_id.to_string());
        self
    }
}

/// Append-only event log
///
/// Implementations must be append-only; events are never mutated or deleted.
pub trait Journal: Send + Sync {
    /// Append an event. Failures are the implementation's to report; callers
    /// treat the journal as best-effort and never let it block execution.
    fn append(&self, event: JournalEvent);
}

/// In-memory journal for tests and single-process audit trails
#[derive(Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<JournalEvent>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, in append order
    pub fn records(&self) -> Vec<JournalEvent> {
        self.records.lock().expect("journal lock poisoned").clone()
    }

    /// Events of a given kind, in append order
    pub fn records_of_kind(&self, kind: &str) -> Vec<JournalEvent> {
        self.records()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, event: JournalEvent) {
        debug!(kind = %event.kind, cycle = ?event.cycle_id, "journal append");
        self.records.lock().expect("journal lock poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_order_preserved() {
        let journal = MemoryJournal::new();
        journal.append(JournalEvent::new("first", json!({})));
        journal.append(JournalEvent::new("second", json!({})).with_cycle("c-1"));

        let records = journal.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, "first");
        assert_eq!(records[1].cycle_id.as_deref(), Some("c-1"));
    }

    #[test]
    fn test_filter_by_kind() {
        let journal = MemoryJournal::new();
        journal.append(JournalEvent::new("a", json!({})));
        journal.append(JournalEvent::new("b", json!({})));
        journal.append(JournalEvent::new("a", json!({})));

        assert_eq!(journal.records_of_kind("a").len(), 2);
        assert_eq!(journal.records_of_kind("missing").len(), 0);
    }
}
