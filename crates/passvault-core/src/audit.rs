//! Audit trail for vault operations
//!
//! Tracks security-relevant events without exposing secret values:
//! - Unlock, failed unlock and lock events (with the lock reason)
//! - Entry creation, update, deletion and reveal
//! - Clipboard copy and clear
//! - Export, import and re-key
//!
//! Events are kept in a bounded in-memory trail owned by the session and
//! emitted through `tracing` under the `passvault::audit` target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;
use uuid::Uuid;

use crate::models::EntryId;

/// Maximum records kept in memory before the oldest are dropped
const MAX_ENTRIES: usize = 1000;

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AuditEvent {
    /// Session was unlocked
    VaultUnlocked,

    /// Failed unlock attempt
    UnlockFailed {
        /// Number of consecutive failures
        attempt_count: u32,
    },

    /// Session was locked
    VaultLocked {
        /// Reason for locking
        reason: LockReason,
    },

    /// Entry was created
    EntryCreated { entry_id: EntryId, service: String },

    /// Entry was updated
    EntryUpdated {
        entry_id: EntryId,
        service: String,
        /// Which fields changed (e.g. "secret", "username", "notes")
        fields: Vec<String>,
    },

    /// Entry was deleted
    EntryDeleted { entry_id: EntryId, service: String },

    /// A decrypted field was handed to the caller
    SecretRevealed {
        entry_id: EntryId,
        service: String,
        /// "secret" or "notes"
        field: String,
    },

    /// A secret was placed on the clipboard
    SecretCopied,

    /// Clipboard was wiped
    ClipboardCleared,

    /// Vault was exported
    VaultExported {
        /// Destination path, not contents
        destination: String,
        count: usize,
    },

    /// Entries were imported
    VaultImported {
        source: String,
        added: usize,
        updated: usize,
        replaced: bool,
    },

    /// All entries were re-encrypted under a new key
    VaultRekeyed { count: usize },
}

/// Reason for session lock
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LockReason {
    /// User manually locked
    Manual,
    /// Auto-lock timeout
    Timeout,
    /// Session ended for good
    Terminated,
}

/// Single audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn new(event: AuditEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Bounded, in-memory audit trail
#[derive(Debug)]
pub struct AuditTrail {
    records: VecDeque<AuditRecord>,
    capacity: usize,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }
}

impl AuditTrail {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record an event and emit it on the audit log target
    pub fn record(&mut self, event: AuditEvent) {
        let record = AuditRecord::new(event);
        match serde_json::to_string(&record.event) {
            Ok(json) => info!(target: "passvault::audit", event = %json, "audit"),
            Err(e) => info!(target: "passvault::audit", error = %e, "audit event not serializable"),
        }

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Most recent records, newest last
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter().skip(self.records.len().saturating_sub(limit))
    }

    pub fn events(&self) -> impl Iterator<Item = &AuditEvent> {
        self.records.iter().map(|r| &r.event)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_read_back() {
        let mut trail = AuditTrail::default();
        trail.record(AuditEvent::VaultUnlocked);
        trail.record(AuditEvent::VaultLocked {
            reason: LockReason::Timeout,
        });

        assert_eq!(trail.len(), 2);
        let events: Vec<_> = trail.events().cloned().collect();
        assert_eq!(
            events,
            vec![
                AuditEvent::VaultUnlocked,
                AuditEvent::VaultLocked {
                    reason: LockReason::Timeout
                }
            ]
        );
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut trail = AuditTrail::with_capacity(2);
        for attempt_count in 1..=3 {
            trail.record(AuditEvent::UnlockFailed { attempt_count });
        }

        let counts: Vec<u32> = trail
            .events()
            .map(|e| match e {
                AuditEvent::UnlockFailed { attempt_count } => *attempt_count,
                _ => panic!("Wrong event type"),
            })
            .collect();
        assert_eq!(counts, vec![2, 3]);
    }

    #[test]
    fn test_recent_limit() {
        let mut trail = AuditTrail::default();
        for _ in 0..5 {
            trail.record(AuditEvent::SecretCopied);
        }
        trail.record(AuditEvent::ClipboardCleared);

        let recent: Vec<_> = trail.recent(2).map(|r| r.event.clone()).collect();
        assert_eq!(recent, vec![AuditEvent::SecretCopied, AuditEvent::ClipboardCleared]);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_string(&AuditEvent::VaultRekeyed { count: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"VaultRekeyed","count":3}"#);
    }
}
