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

//! Ledger event fan-out.
//!
//! Peripheral consumers (notifications, chat broadcast) subscribe to a
//! channel instead of reaching into shared state. Publishing never blocks
//! and never fails the operation that triggered it.

use crate::base::{TransactionId, WalletId};
use crate::money::Money;
use crate::transaction::{TransactionStatus, TransactionType};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    TransactionRecorded {
        id: TransactionId,
        kind: TransactionType,
        status: TransactionStatus,
        amount: Money,
        wallets: Vec<WalletId>,
    },
    TransactionFinalized {
        id: TransactionId,
        kind: TransactionType,
        status: TransactionStatus,
        amount: Money,
    },
    /// Repeated mismatching callbacks for one reference.
    AmountMismatch {
        external_reference: String,
        expected: Decimal,
        reported: Decimal,
        occurrences: u32,
    },
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<LedgerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<LedgerEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Sends to every live subscriber, dropping the ones that hung up.
    pub fn publish(&self, event: LedgerEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
