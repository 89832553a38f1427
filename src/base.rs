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

//! Core identifier types for wallets, owners, transactions and audit events.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Unique identifier for a wallet, personal or group-owned.
    ///
    /// Assigned by the ledger in creation order.
    WalletId
);

numeric_id!(
    /// Unique identifier for a ledger transaction.
    ///
    /// Assigned by the ledger in creation order, so ordering by id is
    /// ordering by creation time.
    TransactionId
);

numeric_id!(
    /// Unique identifier for an inbound settlement callback record.
    AuditEventId
);

numeric_id!(
    /// Identity of a platform user, issued by the user service.
    UserId
);

numeric_id!(
    /// Identity of a savings group, issued by the group service.
    GroupId
);

/// Correlation id shared with the mobile-money network.
///
/// Sent as `externalId` when a settlement is requested and echoed back in
/// the network's callback. Unique across all transactions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ExternalReference(String);

impl ExternalReference {
    /// Generates a fresh random reference.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExternalReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExternalReference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
