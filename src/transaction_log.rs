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

//! Thread-safe transaction log with external-reference deduplication.
//!
//! Rows are individually locked so that a finalize on one transaction never
//! contends with work on another. Map guards are released before a row lock
//! is taken; callers only ever hold the row's own mutex.

use crate::LedgerError;
use crate::base::{ExternalReference, TransactionId};
use crate::transaction::Transaction;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) type TransactionRow = Arc<Mutex<Transaction>>;

/// Append-only transaction store with unique external references.
#[derive(Debug)]
pub struct TransactionLog {
    /// Rows by transaction id.
    rows: DashMap<TransactionId, TransactionRow>,

    /// External reference to transaction id, for O(1) duplicate detection
    /// and callback matching.
    references: DashMap<ExternalReference, TransactionId>,

    next_id: AtomicU64,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            references: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates the next transaction id.
    pub(crate) fn next_id(&self) -> TransactionId {
        TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Binds an external reference to a transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateReference`] if the reference is
    /// already bound.
    pub(crate) fn reserve_reference(
        &self,
        reference: &ExternalReference,
        id: TransactionId,
    ) -> Result<(), LedgerError> {
        // Entry API gives an atomic check-and-insert
        match self.references.entry(reference.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateReference),
            Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(())
            }
        }
    }

    /// Undoes a reservation whose transaction was never written.
    pub(crate) fn release_reference(&self, reference: &ExternalReference, id: TransactionId) {
        self.references.remove_if(reference, |_, bound| *bound == id);
    }

    pub(crate) fn insert(&self, transaction: Transaction) {
        self.rows
            .insert(transaction.id, Arc::new(Mutex::new(transaction)));
    }

    /// Returns a handle to the row; the map guard is dropped before return.
    pub(crate) fn row(&self, id: TransactionId) -> Option<TransactionRow> {
        self.rows.get(&id).map(|row| Arc::clone(row.value()))
    }

    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.row(id).map(|row| row.lock().clone())
    }

    pub fn id_for_reference(&self, reference: &str) -> Option<TransactionId> {
        self.references
            .get(&ExternalReference::from(reference))
            .map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copies every row, ordered by id (creation order).
    pub fn all(&self) -> Vec<Transaction> {
        let rows: Vec<TransactionRow> = self
            .rows
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut transactions: Vec<Transaction> = rows.iter().map(|row| row.lock().clone()).collect();
        transactions.sort_by_key(|tx| tx.id);
        transactions
    }

    /// Rebuilds the log from persisted rows.
    pub(crate) fn restore(transactions: Vec<Transaction>) -> Result<Self, LedgerError> {
        let log = Self::new();
        let mut highest = 0;
        for transaction in transactions {
            if let Some(reference) = &transaction.external_reference {
                log.reserve_reference(reference, transaction.id)?;
            }
            highest = highest.max(transaction.id.0);
            log.insert(transaction);
        }
        log.next_id.store(highest + 1, Ordering::SeqCst);
        Ok(log)
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::transaction::{NewTransaction, TransactionType};
    use chrono::Utc;

    fn deposit(log: &TransactionLog, reference: &str) -> Transaction {
        let new = NewTransaction::new(TransactionType::Deposit, Money::from_minor(5_000))
            .settled_by(ExternalReference::from(reference), "G");
        Transaction::pending(log.next_id(), new, Utc::now())
    }

    #[test]
    fn ids_are_sequential() {
        let log = TransactionLog::new();
        assert_eq!(log.next_id(), TransactionId(1));
        assert_eq!(log.next_id(), TransactionId(2));
    }

    #[test]
    fn duplicate_reference_rejected() {
        let log = TransactionLog::new();
        let reference = ExternalReference::from("R1");
        log.reserve_reference(&reference, TransactionId(1)).unwrap();
        assert_eq!(
            log.reserve_reference(&reference, TransactionId(2)),
            Err(LedgerError::DuplicateReference)
        );
        assert_eq!(log.id_for_reference("R1"), Some(TransactionId(1)));
    }

    #[test]
    fn release_only_removes_own_reservation() {
        let log = TransactionLog::new();
        let reference = ExternalReference::from("R1");
        log.reserve_reference(&reference, TransactionId(1)).unwrap();
        log.release_reference(&reference, TransactionId(2));
        assert_eq!(log.id_for_reference("R1"), Some(TransactionId(1)));
        log.release_reference(&reference, TransactionId(1));
        assert_eq!(log.id_for_reference("R1"), None);
    }

    #[test]
    fn all_returns_rows_in_creation_order() {
        let log = TransactionLog::new();
        let first = deposit(&log, "A");
        let second = deposit(&log, "B");
        log.insert(second.clone());
        log.insert(first.clone());
        let ids: Vec<_> = log.all().into_iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn restore_continues_id_sequence() {
        let log = TransactionLog::new();
        let first = deposit(&log, "A");
        let second = deposit(&log, "B");
        let restored = TransactionLog::restore(vec![first, second.clone()]).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.id_for_reference("B"), Some(second.id));
        assert_eq!(restored.next_id(), TransactionId(3));
    }
}
