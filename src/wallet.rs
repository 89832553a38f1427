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

//! Wallet balances.
//!
//! A wallet has two buckets:
//!
//! ```text
//!   balance ──lock──► locked_balance ──commit──► (left the platform)
//!      ▲                   │
//!      └──────unlock───────┘
//! ```
//!
//! Only personal wallets ever hold locked funds; a group wallet's pool is
//! moved exclusively by contributions and disbursements.
//!
//! # Example
//!
//! ```
//! use groupsave_ledger::{UserId, Wallet, WalletId, WalletOwner, Money};
//!
//! let wallet = Wallet::new(WalletId(1), WalletOwner::User(UserId(1)));
//! assert_eq!(wallet.balance(), Money::ZERO);
//! ```

use crate::LedgerError;
use crate::base::{GroupId, UserId, WalletId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity that exclusively owns a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum WalletOwner {
    User(UserId),
    Group(GroupId),
}

impl WalletOwner {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Self::User(user) => user.0,
            Self::Group(group) => group.0,
        }
    }
}

impl fmt::Display for WalletOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Point-in-time copy of a wallet, safe to hand out and serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub id: WalletId,
    pub owner: WalletOwner,
    pub balance: Money,
    pub locked_balance: Money,
    pub updated_at: DateTime<Utc>,
}

impl WalletSnapshot {
    /// Returns `balance + locked_balance`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] if the sum overflows.
    pub fn total(&self) -> Result<Money, LedgerError> {
        self.balance.checked_add(self.locked_balance)
    }
}

#[derive(Debug)]
pub(crate) struct WalletData {
    id: WalletId,
    owner: WalletOwner,
    balance: Money,
    locked_balance: Money,
    updated_at: DateTime<Utc>,
}

impl WalletData {
    fn new(id: WalletId, owner: WalletOwner) -> Self {
        Self {
            id,
            owner,
            balance: Money::ZERO,
            locked_balance: Money::ZERO,
            updated_at: Utc::now(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            !self.balance.is_negative(),
            "Invariant violated: balance went negative: {}",
            self.balance
        );
        debug_assert!(
            !self.locked_balance.is_negative(),
            "Invariant violated: locked balance went negative: {}",
            self.locked_balance
        );
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.assert_invariants();
    }

    pub(crate) fn id(&self) -> WalletId {
        self.id
    }

    pub(crate) fn balance(&self) -> Money {
        self.balance
    }

    /// Applies a signed delta to the spendable balance.
    pub(crate) fn adjust(&mut self, delta: Money) -> Result<Money, LedgerError> {
        let updated = self.balance.checked_add(delta)?;
        if updated.is_negative() {
            return Err(LedgerError::InsufficientFunds);
        }
        self.balance = updated;
        self.touch();
        Ok(updated)
    }

    /// Increases the spendable balance.
    pub(crate) fn credit(&mut self, amount: Money) -> Result<(), LedgerError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        self.adjust(amount).map(|_| ())
    }

    /// Returns the balance that would remain after debiting `amount`,
    /// without applying it.
    pub(crate) fn balance_after_debit(&self, amount: Money) -> Result<Money, LedgerError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let remaining = self.balance.checked_sub(amount)?;
        if remaining.is_negative() {
            return Err(LedgerError::InsufficientFunds);
        }
        Ok(remaining)
    }

    pub(crate) fn set_balance(&mut self, balance: Money) {
        self.balance = balance;
        self.touch();
    }

    /// Moves funds from balance to locked balance (withdrawal initiated).
    pub(crate) fn lock_funds(&mut self, amount: Money) -> Result<(), LedgerError> {
        if let WalletOwner::Group(_) = self.owner {
            return Err(LedgerError::invalid_state("group wallets cannot hold locked funds"));
        }
        let remaining = self.balance_after_debit(amount)?;
        let locked = self.locked_balance.checked_add(amount)?;
        self.balance = remaining;
        self.locked_balance = locked;
        self.touch();
        Ok(())
    }

    /// Moves funds from locked balance back to balance (withdrawal failed).
    pub(crate) fn unlock_funds(&mut self, amount: Money) -> Result<(), LedgerError> {
        let locked = self.locked_after_release(amount)?;
        let balance = self.balance.checked_add(amount)?;
        self.balance = balance;
        self.locked_balance = locked;
        self.touch();
        Ok(())
    }

    /// Removes funds from locked balance permanently (withdrawal confirmed).
    pub(crate) fn commit_locked(&mut self, amount: Money) -> Result<(), LedgerError> {
        self.locked_balance = self.locked_after_release(amount)?;
        self.touch();
        Ok(())
    }

    fn locked_after_release(&self, amount: Money) -> Result<Money, LedgerError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let locked = self.locked_balance.checked_sub(amount)?;
        // Never clamp: an underflow here means reconciliation went wrong upstream.
        if locked.is_negative() {
            return Err(LedgerError::invalid_state(format!(
                "locked balance underflow on wallet {}: locked {}, requested {}",
                self.id, self.locked_balance, amount
            )));
        }
        Ok(locked)
    }

    pub(crate) fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            id: self.id,
            owner: self.owner,
            balance: self.balance,
            locked_balance: self.locked_balance,
            updated_at: self.updated_at,
        }
    }
}

/// Ledger wallet.
#[derive(Debug)]
pub struct Wallet {
    inner: Mutex<WalletData>,
}

impl Wallet {
    pub fn new(id: WalletId, owner: WalletOwner) -> Self {
        Self {
            inner: Mutex::new(WalletData::new(id, owner)),
        }
    }

    pub(crate) fn restore(snapshot: &WalletSnapshot) -> Result<Self, LedgerError> {
        if snapshot.balance.is_negative() || snapshot.locked_balance.is_negative() {
            return Err(LedgerError::invalid_state(format!(
                "wallet {} restored with a negative balance",
                snapshot.id
            )));
        }
        Ok(Self {
            inner: Mutex::new(WalletData {
                id: snapshot.id,
                owner: snapshot.owner,
                balance: snapshot.balance,
                locked_balance: snapshot.locked_balance,
                updated_at: snapshot.updated_at,
            }),
        })
    }

    /// Exclusive access for a unit of work. Callers must follow the ledger's
    /// lock order (ascending wallet id).
    pub(crate) fn data(&self) -> MutexGuard<'_, WalletData> {
        self.inner.lock()
    }

    pub fn id(&self) -> WalletId {
        self.inner.lock().id
    }

    pub fn owner(&self) -> WalletOwner {
        self.inner.lock().owner
    }

    pub fn balance(&self) -> Money {
        self.inner.lock().balance
    }

    pub fn locked_balance(&self) -> Money {
        self.inner.lock().locked_balance
    }

    /// Returns `balance + locked_balance`, read under one lock.
    pub fn total(&self) -> Result<Money, LedgerError> {
        self.snapshot().total()
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        self.inner.lock().snapshot()
    }
}
