// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Append-only record of every inbound settlement callback.
//!
//! Written before any trust decision is made, so it holds forged and
//! malformed deliveries too. Records are never removed; the only mutation
//! is flipping `processed` once reconciliation succeeds.

use crate::base::{AuditEventId, TransactionId};
use crate::transaction::TransactionStatus;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub received_at: DateTime<Utc>,
    /// The callback body as received; a JSON string when it did not parse.
    pub payload: Value,
    pub signature_valid: bool,
    pub external_reference: Option<String>,
    pub transaction_id: Option<TransactionId>,
    /// Status as reported by the network, before mapping.
    pub reported_status: Option<String>,
    pub processed: bool,
    pub processing_error: Option<String>,
}

/// Fields captured when a callback arrives.
#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    pub payload: Value,
    pub signature_valid: bool,
    pub external_reference: Option<String>,
    pub transaction_id: Option<TransactionId>,
    pub reported_status: Option<String>,
    pub processing_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct AuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(events: Vec<AuditEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    /// Appends a record. Infallible.
    pub fn append(&self, entry: AuditEntry) -> AuditEventId {
        let mut events = self.events.write();
        let id = AuditEventId(events.last().map_or(1, |last| last.id.0 + 1));
        events.push(AuditEvent {
            id,
            received_at: Utc::now(),
            payload: entry.payload,
            signature_valid: entry.signature_valid,
            external_reference: entry.external_reference,
            transaction_id: entry.transaction_id,
            reported_status: entry.reported_status,
            processed: false,
            processing_error: entry.processing_error,
        });
        id
    }

    /// Flags a record as reconciled. Returns `false` for unknown ids.
    pub fn mark_processed(&self, id: AuditEventId) -> bool {
        let mut events = self.events.write();
        // ids are dense and ascending
        match events.binary_search_by_key(&id, |event| event.id) {
            Ok(index) => {
                events[index].processed = true;
                true
            }
            Err(_) => false,
        }
    }

    pub fn get(&self, id: AuditEventId) -> Option<AuditEvent> {
        let events = self.events.read();
        events
            .binary_search_by_key(&id, |event| event.id)
            .ok()
            .map(|index| events[index].clone())
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn all(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    /// Records never reconciled, for operators chasing stuck callbacks.
    pub fn unprocessed(&self) -> Vec<AuditEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| !event.processed)
            .cloned()
            .collect()
    }
}

/// Convenience for tests and reports: the mapped status of a record.
pub fn mapped_status(event: &AuditEvent) -> Option<TransactionStatus> {
    event
        .reported_status
        .as_deref()
        .map(crate::webhook::map_status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_assigns_ascending_ids() {
        let log = AuditLog::new();
        let first = log.append(AuditEntry::default());
        let second = log.append(AuditEntry::default());
        assert_eq!(first, AuditEventId(1));
        assert_eq!(second, AuditEventId(2));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn mark_processed_only_flips_flag() {
        let log = AuditLog::new();
        let id = log.append(AuditEntry {
            payload: json!({"ExternalId": "R1"}),
            signature_valid: true,
            external_reference: Some("R1".into()),
            reported_status: Some("Success".into()),
            ..AuditEntry::default()
        });
        let before = log.get(id).unwrap();
        assert!(log.mark_processed(id));
        let after = log.get(id).unwrap();
        assert!(after.processed);
        assert_eq!(after.payload, before.payload);
        assert_eq!(after.received_at, before.received_at);
        assert_eq!(mapped_status(&after), Some(TransactionStatus::Completed));
        assert!(log.unprocessed().is_empty());
    }

    #[test]
    fn mark_unknown_id() {
        let log = AuditLog::new();
        assert!(!log.mark_processed(AuditEventId(5)));
    }

    #[test]
    fn restore_continues_numbering() {
        let log = AuditLog::new();
        log.append(AuditEntry::default());
        log.append(AuditEntry::default());
        let restored = AuditLog::restore(log.all());
        assert_eq!(restored.append(AuditEntry::default()), AuditEventId(3));
    }
}
