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

//! Error types for ledger, settlement and reconciliation failures.

use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger and settlement errors.
///
/// Every variant propagates to the calling layer; the only benign outcomes
/// (an unknown callback reference, an unrecognised status string) are not
/// errors at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero, negative, or finer than one minor unit
    #[error("invalid amount (must be positive with at most 2 decimal places)")]
    InvalidAmount,

    /// Debit or lock would take the balance below zero
    #[error("insufficient available funds")]
    InsufficientFunds,

    /// Referenced wallet does not exist
    #[error("wallet not found")]
    WalletNotFound,

    /// Owner already holds a wallet
    #[error("owner already has a wallet")]
    DuplicateWallet,

    /// Source and destination wallets are the same
    #[error("source and destination wallet must differ")]
    SameWallet,

    /// Referenced transaction does not exist
    #[error("transaction not found")]
    TransactionNotFound,

    /// External reference is already bound to another transaction
    #[error("duplicate external reference")]
    DuplicateReference,

    /// Reported settlement amount differs from the recorded amount
    #[error("amount mismatch: expected {expected}, reported {reported}")]
    AmountMismatch { expected: Decimal, reported: Decimal },

    /// Callback signature is missing or does not verify
    #[error("invalid callback signature")]
    SignatureInvalid,

    /// Callback lacks a required field
    #[error("malformed callback payload: {0}")]
    MalformedPayload(String),

    /// Phone number cannot be used for a mobile-money request
    #[error("invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    /// Provider name is not a supported mobile-money network
    #[error("unsupported mobile money provider: {0}")]
    UnsupportedProvider(String),

    /// Gateway rejected the request or could not be reached
    #[error("settlement gateway request failed: {0}")]
    GatewayRequestFailed(String),

    /// Illegal state transition or lock accounting underflow
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Actor is not allowed to perform the operation
    #[error("operation not permitted: {0}")]
    NotPermitted(String),
}

impl LedgerError {
    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::WalletNotFound => "WALLET_NOT_FOUND",
            Self::DuplicateWallet => "DUPLICATE_WALLET",
            Self::SameWallet => "SAME_WALLET",
            Self::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            Self::DuplicateReference => "DUPLICATE_REFERENCE",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::InvalidPhoneNumber(_) => "INVALID_PHONE_NUMBER",
            Self::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            Self::GatewayRequestFailed(_) => "GATEWAY_REQUEST_FAILED",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::NotPermitted(_) => "NOT_PERMITTED",
        }
    }
}

/// Snapshot load/store failures.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(#[from] LedgerError),
}

/// Failures while bringing the service up.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("settlement gateway setup failed: {0}")]
    Gateway(#[from] LedgerError),

    #[error("logging setup failed: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("server I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
