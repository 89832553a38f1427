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

//! Transaction records and their state machine.
//!
//! ```text
//!   (deposit, withdrawal)           ┌──► Completed
//!   gateway accepted ──► Pending ───┤
//!                                   └──► Failed
//!
//!   (transfer, contribution, disbursement)
//!   ledger moved ──► Completed
//! ```
//!
//! `Completed` and `Failed` are terminal. Only a webhook-driven finalize may
//! leave `Pending`.

use crate::LedgerError;
use crate::base::{ExternalReference, TransactionId, WalletId};
use crate::gateway::ProviderCode;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Contribution,
    Disbursement,
}

/// Where a transaction's money movement is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Confirmed asynchronously by the mobile-money network.
    External,
    /// Confirmed by the ledger itself at creation.
    Internal,
}

impl TransactionType {
    pub fn settlement(&self) -> Settlement {
        match self {
            Self::Deposit | Self::Withdrawal => Settlement::External,
            Self::Transfer | Self::Contribution | Self::Disbursement => Settlement::Internal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Transfer => "transfer",
            Self::Contribution => "contribution",
            Self::Disbursement => "disbursement",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Balance change applied when an externally settled transaction leaves
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Credit `to_wallet.balance`.
    CreditDestination,
    /// Remove the reserved funds from `from_wallet.locked_balance`.
    CommitLocked,
    /// Return the reserved funds to `from_wallet.balance`.
    UnlockSource,
    /// Nothing moved, nothing to undo.
    NoChange,
}

impl LedgerEffect {
    /// Side-effect table for finalize.
    ///
    /// | type       | completed          | failed         |
    /// |------------|--------------------|----------------|
    /// | deposit    | credit destination | no change      |
    /// | withdrawal | commit locked      | unlock source  |
    ///
    /// Internally settled types and non-terminal targets are rejected.
    pub fn on_finalize(
        kind: TransactionType,
        target: TransactionStatus,
    ) -> Result<Self, LedgerError> {
        match (kind, target) {
            (TransactionType::Deposit, TransactionStatus::Completed) => Ok(Self::CreditDestination),
            (TransactionType::Deposit, TransactionStatus::Failed) => Ok(Self::NoChange),
            (TransactionType::Withdrawal, TransactionStatus::Completed) => Ok(Self::CommitLocked),
            (TransactionType::Withdrawal, TransactionStatus::Failed) => Ok(Self::UnlockSource),
            (TransactionType::Deposit | TransactionType::Withdrawal, TransactionStatus::Pending) => {
                Err(LedgerError::invalid_state("finalize target must be terminal"))
            }
            (
                TransactionType::Transfer
                | TransactionType::Contribution
                | TransactionType::Disbursement,
                _,
            ) => Err(LedgerError::invalid_state(format!(
                "{kind} transactions settle internally and cannot be finalized"
            ))),
        }
    }
}

/// Fields supplied by the caller when a transaction is recorded.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub kind: TransactionType,
    pub amount: Money,
    pub from_wallet: Option<WalletId>,
    pub to_wallet: Option<WalletId>,
    pub external_reference: Option<ExternalReference>,
    pub gateway_reference: Option<String>,
    pub provider: Option<ProviderCode>,
    pub phone_number: Option<String>,
    pub description: String,
}

impl NewTransaction {
    pub fn new(kind: TransactionType, amount: Money) -> Self {
        Self {
            kind,
            amount,
            from_wallet: None,
            to_wallet: None,
            external_reference: None,
            gateway_reference: None,
            provider: None,
            phone_number: None,
            description: String::new(),
        }
    }

    pub fn from_wallet(mut self, wallet: WalletId) -> Self {
        self.from_wallet = Some(wallet);
        self
    }

    pub fn to_wallet(mut self, wallet: WalletId) -> Self {
        self.to_wallet = Some(wallet);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn settled_by(
        mut self,
        external_reference: ExternalReference,
        gateway_reference: impl Into<String>,
    ) -> Self {
        self.external_reference = Some(external_reference);
        self.gateway_reference = Some(gateway_reference.into());
        self
    }

    pub fn mobile_money(mut self, provider: ProviderCode, phone_number: impl Into<String>) -> Self {
        self.provider = Some(provider);
        self.phone_number = Some(phone_number.into());
        self
    }
}

/// Permanent ledger entry for one money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Money,
    pub status: TransactionStatus,
    pub from_wallet: Option<WalletId>,
    pub to_wallet: Option<WalletId>,
    pub external_reference: Option<ExternalReference>,
    pub gateway_reference: Option<String>,
    pub provider: Option<ProviderCode>,
    pub phone_number: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub(crate) fn pending(id: TransactionId, new: NewTransaction, now: DateTime<Utc>) -> Self {
        Self::build(id, new, TransactionStatus::Pending, now)
    }

    pub(crate) fn completed(id: TransactionId, new: NewTransaction, now: DateTime<Utc>) -> Self {
        Self::build(id, new, TransactionStatus::Completed, now)
    }

    fn build(
        id: TransactionId,
        new: NewTransaction,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: new.kind,
            amount: new.amount,
            status,
            from_wallet: new.from_wallet,
            to_wallet: new.to_wallet,
            external_reference: new.external_reference,
            gateway_reference: new.gateway_reference,
            provider: new.provider,
            phone_number: new.phone_number,
            description: new.description,
            created_at: now,
            updated_at: now,
            completed_at: (status == TransactionStatus::Completed).then_some(now),
        }
    }

    /// Checks that moving to `target` is a legal transition.
    pub fn ensure_transition(&self, target: TransactionStatus) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::invalid_state(format!(
                "transaction {} is already {}",
                self.id, self.status
            )));
        }
        if !target.is_terminal() {
            return Err(LedgerError::invalid_state("finalize target must be terminal"));
        }
        Ok(())
    }

    /// Moves a pending transaction into a terminal state.
    pub(crate) fn transition(
        &mut self,
        target: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.ensure_transition(target)?;
        self.status = target;
        self.updated_at = now;
        if target == TransactionStatus::Completed {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Wallets this transaction touches, in lock order.
    pub fn wallets(&self) -> Vec<WalletId> {
        let mut wallets: Vec<WalletId> = self.from_wallet.into_iter().chain(self.to_wallet).collect();
        wallets.sort();
        wallets.dedup();
        wallets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_withdrawal() -> Transaction {
        let new = NewTransaction::new(TransactionType::Withdrawal, Money::from_minor(3_000))
            .from_wallet(WalletId(1))
            .settled_by(ExternalReference::from("R1"), "G1");
        Transaction::pending(TransactionId(1), new, Utc::now())
    }

    #[test]
    fn settlement_classification() {
        assert_eq!(TransactionType::Deposit.settlement(), Settlement::External);
        assert_eq!(TransactionType::Withdrawal.settlement(), Settlement::External);
        assert_eq!(TransactionType::Transfer.settlement(), Settlement::Internal);
        assert_eq!(TransactionType::Contribution.settlement(), Settlement::Internal);
        assert_eq!(TransactionType::Disbursement.settlement(), Settlement::Internal);
    }

    #[test]
    fn finalize_effect_table() {
        use TransactionStatus::*;
        use TransactionType::*;
        assert_eq!(
            LedgerEffect::on_finalize(Deposit, Completed),
            Ok(LedgerEffect::CreditDestination)
        );
        assert_eq!(LedgerEffect::on_finalize(Deposit, Failed), Ok(LedgerEffect::NoChange));
        assert_eq!(
            LedgerEffect::on_finalize(Withdrawal, Completed),
            Ok(LedgerEffect::CommitLocked)
        );
        assert_eq!(
            LedgerEffect::on_finalize(Withdrawal, Failed),
            Ok(LedgerEffect::UnlockSource)
        );
        for kind in [Transfer, Contribution, Disbursement] {
            assert!(matches!(
                LedgerEffect::on_finalize(kind, Completed),
                Err(LedgerError::InvalidState(_))
            ));
        }
        assert!(LedgerEffect::on_finalize(Deposit, Pending).is_err());
    }

    #[test]
    fn transition_sets_completed_at() {
        let mut tx = pending_withdrawal();
        assert!(tx.completed_at.is_none());
        tx.transition(TransactionStatus::Completed, Utc::now()).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.completed_at.is_some());
    }

    #[test]
    fn failed_transition_leaves_completed_at_empty() {
        let mut tx = pending_withdrawal();
        tx.transition(TransactionStatus::Failed, Utc::now()).unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert!(tx.completed_at.is_none());
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut tx = pending_withdrawal();
        tx.transition(TransactionStatus::Completed, Utc::now()).unwrap();
        assert!(tx.transition(TransactionStatus::Failed, Utc::now()).is_err());
        assert!(tx.transition(TransactionStatus::Pending, Utc::now()).is_err());
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn completed_records_are_created_with_completed_at() {
        let new = NewTransaction::new(TransactionType::Transfer, Money::from_minor(4_000))
            .from_wallet(WalletId(2))
            .to_wallet(WalletId(1));
        let tx = Transaction::completed(TransactionId(9), new, Utc::now());
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.completed_at, Some(tx.created_at));
        assert_eq!(tx.wallets(), vec![WalletId(1), WalletId(2)]);
    }

    #[test]
    fn serializes_type_and_status_lowercase() {
        let json = serde_json::to_value(pending_withdrawal()).unwrap();
        assert_eq!(json["type"], "withdrawal");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["amount"], "30.00");
        assert_eq!(json["external_reference"], "R1");
    }
}
