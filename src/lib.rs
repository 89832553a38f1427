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

//! # GroupSave Ledger
//!
//! Wallet ledger and settlement engine for a group-savings platform. Users
//! hold wallets, groups hold pooled wallets, and money moves by deposit,
//! withdrawal, transfer, contribution and disbursement. Deposits and
//! withdrawals settle against a mobile-money network and are confirmed only
//! by a signed callback.
//!
//! ## Core Components
//!
//! - [`Ledger`]: wallets and transactions, with atomic balance operations
//! - [`Engine`]: the five user actions, gated by identity and membership
//! - [`SettlementGateway`]: live and simulated mobile-money clients
//! - [`WebhookReconciler`]: audits, authenticates and applies callbacks
//! - [`LedgerError`]: failure taxonomy shared by every layer
//!
//! ## Example
//!
//! ```
//! use groupsave_ledger::{
//!     Ledger, Money, NewTransaction, TransactionStatus, TransactionType, UserId, WalletOwner,
//! };
//! use rust_decimal_macros::dec;
//!
//! let ledger = Ledger::new();
//! let alice = ledger.open_wallet(WalletOwner::User(UserId(1))).unwrap();
//! let bob = ledger.open_wallet(WalletOwner::User(UserId(2))).unwrap();
//! ledger.adjust_balance(alice, Money::positive(dec!(40)).unwrap()).unwrap();
//!
//! let tx = ledger
//!     .record_completed(
//!         NewTransaction::new(TransactionType::Transfer, Money::positive(dec!(40)).unwrap())
//!             .from_wallet(alice)
//!             .to_wallet(bob),
//!     )
//!     .unwrap();
//!
//! assert_eq!(tx.status, TransactionStatus::Completed);
//! assert_eq!(ledger.wallet(alice).unwrap().balance(), Money::ZERO);
//! assert_eq!(ledger.wallet(bob).unwrap().balance().to_string(), "40.00");
//! ```
//!
//! ## Thread Safety
//!
//! Every wallet and every transaction row has its own lock. Operations on
//! distinct wallets run in parallel; operations on the same wallet
//! serialize. See [`ledger`] for the lock order.

pub mod audit;
mod base;
pub mod config;
pub mod directory;
mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod ledger;
pub mod logging;
mod money;
pub mod persistence;
mod transaction;
mod transaction_log;
mod wallet;
pub mod webhook;

pub use audit::{AuditEntry, AuditEvent, AuditLog};
pub use base::{AuditEventId, ExternalReference, GroupId, TransactionId, UserId, WalletId};
pub use crate::config::Settings;
pub use directory::{AccessPolicy, Membership, WalletDirectory};
pub use engine::{Engine, MobileMoneyRequest};
pub use error::{LedgerError, PersistenceError, StartupError};
pub use events::{EventBus, LedgerEvent};
pub use gateway::{
    HubtelGateway, ProviderCode, ProvisionalSettlement, SettlementGateway, SettlementRequest,
    SimulatedGateway,
};
pub use ledger::{Finalized, Ledger, LedgerSnapshot, SettlementView};
pub use money::Money;
pub use persistence::Snapshot;
pub use transaction::{
    LedgerEffect, NewTransaction, Settlement, Transaction, TransactionStatus, TransactionType,
};
pub use transaction_log::TransactionLog;
pub use wallet::{Wallet, WalletOwner, WalletSnapshot};
pub use webhook::{CallbackOutcome, WebhookReconciler};
