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

//! Mobile-money network codes.

use crate::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical network code sent to the settlement gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderCode {
    #[serde(rename = "mtn")]
    Mtn,
    #[serde(rename = "vod")]
    Vodafone,
    #[serde(rename = "tgo")]
    AirtelTigo,
}

impl ProviderCode {
    /// Maps free-form user input to a network code.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnsupportedProvider`] for empty or unknown names.
    pub fn normalize(input: &str) -> Result<Self, LedgerError> {
        let key = input.trim().to_lowercase();
        match key.as_str() {
            "mtn" | "mtn mobile money" | "mtn momo" | "mtn-momo" | "momo" => Ok(Self::Mtn),
            "vod" | "vodafone" | "vodafone cash" | "voda" => Ok(Self::Vodafone),
            "tgo" | "airteltigo" | "airtel" | "tigo" | "airteltigo money" | "airtel tigo"
            | "airtel-tigo" => Ok(Self::AirtelTigo),
            _ => Err(LedgerError::UnsupportedProvider(input.to_string())),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Mtn => "mtn",
            Self::Vodafone => "vod",
            Self::AirtelTigo => "tgo",
        }
    }
}

impl FromStr for ProviderCode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl fmt::Display for ProviderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
