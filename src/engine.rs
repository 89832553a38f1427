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

//! User-facing money movement.
//!
//! The [`Engine`] turns the five user actions into ledger operations:
//!
//! - **Deposit**: request collection from the network, record a pending
//!   deposit. The wallet is credited only when the callback confirms it.
//! - **Withdrawal**: request a payout, then lock the funds and record a
//!   pending withdrawal in one unit of work.
//! - **Transfer**, **Contribution**, **Disbursement**: settle inside the
//!   ledger and are recorded already completed.
//!
//! Identity and authorization are delegated to [`WalletDirectory`] and
//! [`AccessPolicy`]; both are consulted before anything is mutated.
//!
//! # Thread Safety
//!
//! The engine is `Send + Sync` and meant to be shared behind an `Arc`.
//! Operations on distinct wallets never contend.

use crate::base::{ExternalReference, GroupId, UserId, WalletId};
use crate::directory::{AccessPolicy, WalletDirectory};
use crate::events::{EventBus, LedgerEvent};
use crate::gateway::{SettlementGateway, SettlementRequest};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::transaction::{NewTransaction, Transaction, TransactionType};
use crate::wallet::WalletOwner;
use crate::LedgerError;
use serde::Deserialize;
use std::sync::Arc;

/// A deposit or withdrawal against a customer's mobile-money account.
#[derive(Debug, Clone, Deserialize)]
pub struct MobileMoneyRequest {
    pub phone_number: String,
    pub amount: Money,
    /// Network name as the user typed it, e.g. `"MTN MoMo"`.
    pub provider: String,
}

pub struct Engine {
    ledger: Arc<Ledger>,
    gateway: Arc<dyn SettlementGateway>,
    directory: Arc<dyn WalletDirectory>,
    access: Arc<dyn AccessPolicy>,
    events: Arc<EventBus>,
}

impl Engine {
    /// Creates an engine that resolves wallets through the ledger itself.
    pub fn new(
        ledger: Arc<Ledger>,
        gateway: Arc<dyn SettlementGateway>,
        access: Arc<dyn AccessPolicy>,
        events: Arc<EventBus>,
    ) -> Self {
        let directory: Arc<dyn WalletDirectory> = ledger.clone();
        Engine {
            ledger,
            gateway,
            directory,
            access,
            events,
        }
    }

    /// Replaces the owner-to-wallet resolver.
    pub fn with_directory(mut self, directory: Arc<dyn WalletDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Starts a deposit from the user's mobile-money account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::WalletNotFound`] - user has no wallet.
    /// - [`LedgerError::InvalidAmount`] - non-positive amount.
    /// - [`LedgerError::UnsupportedProvider`] - unknown network.
    /// - [`LedgerError::GatewayRequestFailed`] - nothing was recorded.
    pub async fn deposit(
        &self,
        user: UserId,
        request: MobileMoneyRequest,
    ) -> Result<Transaction, LedgerError> {
        let wallet = self.resolve(WalletOwner::User(user))?;
        let settlement = self.settlement_request(&request)?;

        let provisional = self
            .gateway
            .request_inbound(&settlement)
            .await
            .inspect_err(|e| {
                tracing::warn!(user = %user, reference = %settlement.external_reference, error = %e, "deposit request failed");
            })?;

        let new = NewTransaction::new(TransactionType::Deposit, settlement.amount)
            .to_wallet(wallet)
            .settled_by(provisional.external_reference, provisional.gateway_reference)
            .mobile_money(settlement.provider, settlement.phone_number)
            .description("Wallet deposit");
        let transaction = self.ledger.record_pending(new)?;
        self.recorded(&transaction);
        Ok(transaction)
    }

    /// Starts a payout to the user's mobile-money account.
    ///
    /// The balance is checked before the network is contacted; the lock
    /// itself happens together with the row write once the request is
    /// accepted.
    ///
    /// # Errors
    ///
    /// As [`Engine::deposit`], plus [`LedgerError::InsufficientFunds`].
    pub async fn withdraw(
        &self,
        user: UserId,
        request: MobileMoneyRequest,
    ) -> Result<Transaction, LedgerError> {
        let wallet = self.resolve(WalletOwner::User(user))?;
        let settlement = self.settlement_request(&request)?;

        if self.ledger.wallet(wallet)?.balance() < settlement.amount {
            return Err(LedgerError::InsufficientFunds);
        }

        let provisional = self
            .gateway
            .request_outbound(&settlement)
            .await
            .inspect_err(|e| {
                tracing::warn!(user = %user, reference = %settlement.external_reference, error = %e, "withdrawal request failed");
            })?;
        let reference = provisional.external_reference.clone();

        let new = NewTransaction::new(TransactionType::Withdrawal, settlement.amount)
            .from_wallet(wallet)
            .settled_by(provisional.external_reference, provisional.gateway_reference)
            .mobile_money(settlement.provider, settlement.phone_number)
            .description("Wallet withdrawal");
        let transaction = self.ledger.record_pending(new).inspect_err(|e| {
            // The payout request is already with the network.
            tracing::error!(
                alert = "withdrawal_not_recorded",
                wallet = %wallet,
                %reference,
                error = %e,
                "payout requested but funds could not be locked"
            );
        })?;
        self.recorded(&transaction);
        Ok(transaction)
    }

    /// Moves funds between two users.
    pub fn transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: Money,
        description: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let amount = positive(amount)?;
        let source = self.resolve(WalletOwner::User(from))?;
        let target = self.resolve(WalletOwner::User(to))?;

        let new = NewTransaction::new(TransactionType::Transfer, amount)
            .from_wallet(source)
            .to_wallet(target)
            .description(description.unwrap_or_else(|| "Wallet transfer".to_string()));
        self.complete(new)
    }

    /// Moves funds from a member's wallet into the group pool.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotPermitted`] if the user is not a member.
    pub fn contribute(
        &self,
        user: UserId,
        group: GroupId,
        amount: Money,
    ) -> Result<Transaction, LedgerError> {
        let amount = positive(amount)?;
        if !self.access.is_member(user, group) {
            return Err(LedgerError::NotPermitted(format!(
                "user {user} is not a member of group {group}"
            )));
        }
        let source = self.resolve(WalletOwner::User(user))?;
        let pool = self.resolve(WalletOwner::Group(group))?;

        let new = NewTransaction::new(TransactionType::Contribution, amount)
            .from_wallet(source)
            .to_wallet(pool)
            .description(format!("Contribution to group {group}"));
        self.complete(new)
    }

    /// Pays out of the group pool to a member.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotPermitted`] if `admin` is not a group admin or the
    /// recipient is not a member.
    pub fn disburse(
        &self,
        admin: UserId,
        group: GroupId,
        recipient: UserId,
        amount: Money,
        description: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let amount = positive(amount)?;
        if !self.access.is_admin(admin, group) {
            return Err(LedgerError::NotPermitted(format!(
                "user {admin} is not an admin of group {group}"
            )));
        }
        if !self.access.is_member(recipient, group) {
            return Err(LedgerError::NotPermitted(format!(
                "recipient {recipient} is not a member of group {group}"
            )));
        }
        let pool = self.resolve(WalletOwner::Group(group))?;
        let target = self.resolve(WalletOwner::User(recipient))?;

        let new = NewTransaction::new(TransactionType::Disbursement, amount)
            .from_wallet(pool)
            .to_wallet(target)
            .description(description.unwrap_or_else(|| format!("Disbursement from group {group}")));
        self.complete(new)
    }

    fn resolve(&self, owner: WalletOwner) -> Result<WalletId, LedgerError> {
        self.directory
            .wallet_of(owner)
            .ok_or(LedgerError::WalletNotFound)
    }

    fn settlement_request(&self, request: &MobileMoneyRequest) -> Result<SettlementRequest, LedgerError> {
        SettlementRequest::new(
            ExternalReference::generate(),
            &request.phone_number,
            positive(request.amount)?,
            &request.provider,
        )
    }

    fn complete(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        let transaction = self.ledger.record_completed(new)?;
        self.recorded(&transaction);
        Ok(transaction)
    }

    fn recorded(&self, transaction: &Transaction) {
        tracing::info!(
            transaction_id = %transaction.id,
            kind = %transaction.kind,
            status = %transaction.status,
            amount = %transaction.amount,
            "transaction recorded"
        );
        self.events.publish(LedgerEvent::TransactionRecorded {
            id: transaction.id,
            kind: transaction.kind,
            status: transaction.status,
            amount: transaction.amount,
            wallets: transaction.wallets(),
        });
    }
}

fn positive(amount: Money) -> Result<Money, LedgerError> {
    if amount.is_negative() || amount.is_zero() {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(amount)
}
