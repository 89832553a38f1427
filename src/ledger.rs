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

//! Ledger store.
//!
//! The [`Ledger`] owns every wallet and the transaction log and exposes the
//! atomic read-modify-write operations all money movement goes through.
//!
//! # Units of work
//!
//! A balance change and the transaction row that explains it are applied as
//! one unit: every affected wallet mutex is held until the row has been
//! written or updated, so no reader observes one without the other.
//!
//! # Lock order
//!
//! 1. ledger epoch, shared by every unit of work and taken exclusively by
//!    [`Ledger::snapshot`],
//! 2. transaction row mutex (finalize only),
//! 3. wallet mutexes in ascending [`WalletId`] order.
//!
//! Map guards are never held while waiting for a row or wallet mutex. Two
//! distinct wallets are updated without contention. The epoch is taken once
//! per public call and never re-entered.

use crate::base::{TransactionId, WalletId};
use crate::directory::WalletDirectory;
use crate::money::Money;
use crate::transaction::{
    LedgerEffect, NewTransaction, Settlement, Transaction, TransactionStatus, TransactionType,
};
use crate::transaction_log::TransactionLog;
use crate::wallet::{Wallet, WalletData, WalletOwner, WalletSnapshot};
use crate::LedgerError;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{MutexGuard, RwLock, RwLockReadGuard};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of a finalize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    /// The transition and its ledger effect were applied.
    Applied(Transaction),
    /// The transaction already had the requested status.
    Unchanged(Transaction),
}

impl Finalized {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Self::Applied(tx) | Self::Unchanged(tx) => tx,
        }
    }
}

/// Consistent read of a transaction and the wallets it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementView {
    pub transaction: Transaction,
    pub wallets: Vec<WalletSnapshot>,
}

/// Full persisted state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub wallets: Vec<WalletSnapshot>,
    pub transactions: Vec<Transaction>,
}

/// Concurrent wallet and transaction store.
pub struct Ledger {
    wallets: DashMap<WalletId, Arc<Wallet>>,
    /// Owner to wallet, enforcing one wallet per owner.
    owners: DashMap<WalletOwner, WalletId>,
    transactions: TransactionLog,
    next_wallet_id: AtomicU64,
    /// Shared by units of work, exclusive for a consistent snapshot.
    epoch: RwLock<()>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger {
            wallets: DashMap::new(),
            owners: DashMap::new(),
            transactions: TransactionLog::new(),
            next_wallet_id: AtomicU64::new(1),
            epoch: RwLock::new(()),
        }
    }

    /// Creates the wallet for a newly created user or group.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateWallet`] if the owner already has one.
    pub fn open_wallet(&self, owner: WalletOwner) -> Result<WalletId, LedgerError> {
        let _epoch = self.unit_of_work();
        match self.owners.entry(owner) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateWallet),
            Entry::Vacant(entry) => {
                let id = WalletId(self.next_wallet_id.fetch_add(1, Ordering::SeqCst));
                self.wallets.insert(id, Arc::new(Wallet::new(id, owner)));
                entry.insert(id);
                tracing::debug!(wallet = %id, %owner, "wallet opened");
                Ok(id)
            }
        }
    }

    pub fn wallet(&self, id: WalletId) -> Result<Arc<Wallet>, LedgerError> {
        self.wallets
            .get(&id)
            .map(|wallet| Arc::clone(wallet.value()))
            .ok_or(LedgerError::WalletNotFound)
    }

    pub fn wallet_for(&self, owner: WalletOwner) -> Option<WalletId> {
        self.owners.get(&owner).map(|entry| *entry.value())
    }

    /// Copies every wallet, ordered by id.
    pub fn wallets(&self) -> Vec<WalletSnapshot> {
        let wallets: Vec<Arc<Wallet>> = self
            .wallets
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut snapshots: Vec<WalletSnapshot> = wallets.iter().map(|w| w.snapshot()).collect();
        snapshots.sort_by_key(|w| w.id);
        snapshots
    }

    pub fn transactions(&self) -> &TransactionLog {
        &self.transactions
    }

    pub fn transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.transactions.get(id)
    }

    pub fn transaction_by_reference(&self, reference: &str) -> Option<Transaction> {
        self.transactions
            .id_for_reference(reference)
            .and_then(|id| self.transactions.get(id))
    }

    /// Applies a signed delta to a wallet's spendable balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientFunds`] if the balance would go negative.
    pub fn adjust_balance(&self, id: WalletId, delta: Money) -> Result<Money, LedgerError> {
        let _epoch = self.unit_of_work();
        let wallet = self.wallet(id)?;
        let mut data = wallet.data();
        data.adjust(delta)
    }

    /// Debits one wallet and credits another, or changes neither.
    pub fn transfer(&self, from: WalletId, to: WalletId, amount: Money) -> Result<(), LedgerError> {
        let _epoch = self.unit_of_work();
        self.with_pair(from, to, |source, target| move_funds(source, target, amount))
    }

    /// Reserves funds for an outbound settlement.
    pub fn lock(&self, id: WalletId, amount: Money) -> Result<(), LedgerError> {
        let _epoch = self.unit_of_work();
        self.wallet(id)?.data().lock_funds(amount)
    }

    /// Returns reserved funds to the spendable balance.
    pub fn unlock(&self, id: WalletId, amount: Money) -> Result<(), LedgerError> {
        let _epoch = self.unit_of_work();
        self.wallet(id)?.data().unlock_funds(amount)
    }

    /// Removes reserved funds for good.
    pub fn commit_locked(&self, id: WalletId, amount: Money) -> Result<(), LedgerError> {
        let _epoch = self.unit_of_work();
        self.wallet(id)?.data().commit_locked(amount)
    }

    /// Records an externally settled transaction as `Pending`.
    ///
    /// For a withdrawal the amount is locked on the source wallet in the same
    /// unit of work as the row write. A deposit moves nothing until it is
    /// finalized.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::DuplicateReference`] - reference already recorded.
    /// - [`LedgerError::InsufficientFunds`] - withdrawal exceeds balance.
    /// - [`LedgerError::WalletNotFound`] - referenced wallet missing.
    /// - [`LedgerError::InvalidState`] - not an externally settled type, or
    ///   the reference/wallet fields are missing.
    pub fn record_pending(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        if new.kind.settlement() != Settlement::External {
            return Err(LedgerError::invalid_state(format!(
                "{} transactions cannot be pending",
                new.kind
            )));
        }
        let reference = new
            .external_reference
            .clone()
            .ok_or_else(|| LedgerError::invalid_state("pending transaction needs a reference"))?;

        let _epoch = self.unit_of_work();
        let id = self.transactions.next_id();
        self.transactions.reserve_reference(&reference, id)?;

        let result = self.write_pending(id, new);
        if result.is_err() {
            self.transactions.release_reference(&reference, id);
        }
        result
    }

    fn write_pending(&self, id: TransactionId, new: NewTransaction) -> Result<Transaction, LedgerError> {
        match new.kind {
            TransactionType::Deposit => {
                let to = new
                    .to_wallet
                    .ok_or_else(|| LedgerError::invalid_state("deposit needs a destination"))?;
                let wallet = self.wallet(to)?;
                let _guard = wallet.data();
                let transaction = Transaction::pending(id, new, Utc::now());
                self.transactions.insert(transaction.clone());
                Ok(transaction)
            }
            TransactionType::Withdrawal => {
                let from = new
                    .from_wallet
                    .ok_or_else(|| LedgerError::invalid_state("withdrawal needs a source"))?;
                let wallet = self.wallet(from)?;
                let mut data = wallet.data();
                data.lock_funds(new.amount)?;
                let transaction = Transaction::pending(id, new, Utc::now());
                self.transactions.insert(transaction.clone());
                Ok(transaction)
            }
            TransactionType::Transfer
            | TransactionType::Contribution
            | TransactionType::Disbursement => Err(LedgerError::invalid_state(format!(
                "{} transactions cannot be pending",
                new.kind
            ))),
        }
    }

    /// Records an internally settled transaction: moves the funds and writes
    /// the row as `Completed` in one unit of work.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientFunds`] - source balance too low.
    /// - [`LedgerError::WalletNotFound`] - either wallet missing.
    /// - [`LedgerError::SameWallet`] - source equals destination.
    /// - [`LedgerError::InvalidState`] - externally settled type, or a
    ///   wallet field is missing.
    pub fn record_completed(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        if new.kind.settlement() != Settlement::Internal {
            return Err(LedgerError::invalid_state(format!(
                "{} transactions must settle externally",
                new.kind
            )));
        }
        let (Some(from), Some(to)) = (new.from_wallet, new.to_wallet) else {
            return Err(LedgerError::invalid_state(format!(
                "{} needs a source and a destination",
                new.kind
            )));
        };

        let _epoch = self.unit_of_work();
        self.with_pair(from, to, |source, target| {
            move_funds(source, target, new.amount)?;
            let transaction = Transaction::completed(self.transactions.next_id(), new, Utc::now());
            self.transactions.insert(transaction.clone());
            Ok(transaction)
        })
    }

    /// Applies an externally reported final status to a pending transaction.
    ///
    /// Checks run in order: existence, settlement kind, amount integrity,
    /// idempotency, transition legality. Nothing is mutated unless all pass.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TransactionNotFound`] - unknown id.
    /// - [`LedgerError::InvalidState`] - internally settled type, terminal
    ///   transaction with a different status, or lock underflow.
    /// - [`LedgerError::AmountMismatch`] - reported amount differs.
    pub fn finalize(
        &self,
        id: TransactionId,
        target: TransactionStatus,
        reported_amount: Decimal,
    ) -> Result<Finalized, LedgerError> {
        let _epoch = self.unit_of_work();
        let row = self
            .transactions
            .row(id)
            .ok_or(LedgerError::TransactionNotFound)?;
        let mut transaction = row.lock();

        if transaction.kind.settlement() != Settlement::External {
            return Err(LedgerError::invalid_state(format!(
                "{} transactions settle internally and cannot be finalized",
                transaction.kind
            )));
        }
        if transaction.amount.as_decimal() != reported_amount {
            return Err(LedgerError::AmountMismatch {
                expected: transaction.amount.as_decimal(),
                reported: reported_amount,
            });
        }
        if transaction.status == target {
            return Ok(Finalized::Unchanged(transaction.clone()));
        }
        transaction.ensure_transition(target)?;

        let effect = LedgerEffect::on_finalize(transaction.kind, target)?;
        let wallet = match effect {
            LedgerEffect::CreditDestination => Some(required(transaction.to_wallet)?),
            LedgerEffect::CommitLocked | LedgerEffect::UnlockSource => {
                Some(required(transaction.from_wallet)?)
            }
            LedgerEffect::NoChange => None,
        }
        .map(|id| self.wallet(id))
        .transpose()?;

        // Held until the row is updated so readers never see half of it.
        let mut guard = wallet.as_ref().map(|w| w.data());
        if let Some(data) = guard.as_mut() {
            let amount = transaction.amount;
            match effect {
                LedgerEffect::CreditDestination => data.credit(amount)?,
                LedgerEffect::CommitLocked => data.commit_locked(amount)?,
                LedgerEffect::UnlockSource => data.unlock_funds(amount)?,
                LedgerEffect::NoChange => {}
            }
        }
        transaction.transition(target, Utc::now())?;
        drop(guard);

        Ok(Finalized::Applied(transaction.clone()))
    }

    /// Reads a transaction together with its wallets under their locks.
    pub fn settlement_view(&self, id: TransactionId) -> Option<SettlementView> {
        let row = self.transactions.row(id)?;
        let transaction = row.lock();
        let wallets: Vec<Arc<Wallet>> = transaction
            .wallets()
            .into_iter()
            .filter_map(|id| self.wallet(id).ok())
            .collect();
        let guards: Vec<MutexGuard<'_, WalletData>> = wallets.iter().map(|w| w.data()).collect();
        Some(SettlementView {
            transaction: transaction.clone(),
            wallets: guards.iter().map(|data| data.snapshot()).collect(),
        })
    }

    /// Copies wallets and transactions for persistence.
    ///
    /// Waits for in-flight units of work and holds off new ones, so the copy
    /// is a single cut: every transaction row agrees with the balances.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let _epoch = self.epoch.write();
        LedgerSnapshot {
            wallets: self.wallets(),
            transactions: self.transactions.all(),
        }
    }

    /// Rebuilds a ledger from persisted state.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::DuplicateWallet`] - two wallets share an owner.
    /// - [`LedgerError::InvalidState`] - a negative balance, or a wallet whose
    ///   locked balance differs from its pending withdrawals.
    pub fn restore(snapshot: &LedgerSnapshot) -> Result<Self, LedgerError> {
        let mut pending_locks = pending_withdrawals(&snapshot.transactions)?;
        let wallets = DashMap::new();
        let owners = DashMap::new();
        let mut highest = 0;
        for saved in &snapshot.wallets {
            if owners.insert(saved.owner, saved.id).is_some() {
                return Err(LedgerError::DuplicateWallet);
            }
            let locked = pending_locks.remove(&saved.id).unwrap_or(Money::ZERO);
            if saved.locked_balance != locked {
                return Err(LedgerError::invalid_state(format!(
                    "wallet {} has {} locked but {} in pending withdrawals",
                    saved.id, saved.locked_balance, locked
                )));
            }
            wallets.insert(saved.id, Arc::new(Wallet::restore(saved)?));
            highest = highest.max(saved.id.0);
        }
        let ledger = Ledger {
            wallets,
            owners,
            transactions: TransactionLog::restore(snapshot.transactions.clone())?,
            next_wallet_id: AtomicU64::new(highest + 1),
            epoch: RwLock::new(()),
        };
        if let Some(orphan) = pending_locks.keys().next() {
            return Err(LedgerError::invalid_state(format!(
                "pending withdrawal from unknown wallet {orphan}"
            )));
        }
        Ok(ledger)
    }

    fn unit_of_work(&self) -> RwLockReadGuard<'_, ()> {
        self.epoch.read()
    }

    /// Locks two distinct wallets in ascending id order and hands them to
    /// `f` as `(source, target)`.
    fn with_pair<T>(
        &self,
        from: WalletId,
        to: WalletId,
        f: impl FnOnce(&mut WalletData, &mut WalletData) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        if from == to {
            return Err(LedgerError::SameWallet);
        }
        let source = self.wallet(from)?;
        let target = self.wallet(to)?;

        let (mut source_data, mut target_data) = if from < to {
            let s = source.data();
            let t = target.data();
            (s, t)
        } else {
            let t = target.data();
            let s = source.data();
            (s, t)
        };
        f(&mut source_data, &mut target_data)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletDirectory for Ledger {
    fn wallet_of(&self, owner: WalletOwner) -> Option<WalletId> {
        self.wallet_for(owner)
    }
}

/// Sum of pending withdrawal amounts per source wallet.
fn pending_withdrawals(
    transactions: &[Transaction],
) -> Result<HashMap<WalletId, Money>, LedgerError> {
    let mut locks: HashMap<WalletId, Money> = HashMap::new();
    for tx in transactions {
        if tx.kind != TransactionType::Withdrawal || tx.status != TransactionStatus::Pending {
            continue;
        }
        let from = required(tx.from_wallet)?;
        let total = locks.entry(from).or_insert(Money::ZERO);
        *total = total.checked_add(tx.amount)?;
    }
    Ok(locks)
}

fn required(wallet: Option<WalletId>) -> Result<WalletId, LedgerError> {
    wallet.ok_or_else(|| LedgerError::invalid_state("transaction is missing its wallet"))
}

/// Computes both new balances before writing either, so a failure leaves
/// both wallets untouched.
fn move_funds(
    source: &mut WalletData,
    target: &mut WalletData,
    amount: Money,
) -> Result<(), LedgerError> {
    let debited = source.balance_after_debit(amount)?;
    let credited = target.balance().checked_add(amount)?;
    debug_assert_ne!(source.id(), target.id());
    source.set_balance(debited);
    target.set_balance(credited);
    Ok(())
}
