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

//! Exact two-decimal money amounts.
//!
//! # Example
//!
//! ```
//! use groupsave_ledger::Money;
//! use rust_decimal_macros::dec;
//!
//! let amount = Money::positive(dec!(30.5)).unwrap();
//! assert_eq!(amount.to_string(), "30.50");
//! assert!(Money::positive(dec!(0.001)).is_err());
//! ```

use crate::LedgerError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A monetary value with exactly two fractional digits.
///
/// Backed by [`Decimal`]; no binary floating point is involved anywhere.
/// Values may be negative so that balance deltas can be expressed, but every
/// transaction amount is built with [`Money::positive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Number of fractional digits carried by the supported currency.
    pub const SCALE: u32 = 2;

    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Builds a money value, rejecting anything finer than one minor unit.
    ///
    /// Trailing zeros past the second decimal place are accepted
    /// (`30.000` is `30.00`); significant digits are not silently rounded.
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        let mut normalized = value;
        if normalized.scale() > Self::SCALE {
            let rounded = normalized.round_dp(Self::SCALE);
            if rounded != normalized {
                return Err(LedgerError::InvalidAmount);
            }
            normalized = rounded;
        }
        Money::rescaled(normalized)
    }

    /// Builds a strictly positive money value.
    pub fn positive(value: Decimal) -> Result<Self, LedgerError> {
        if value <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        Self::new(value)
    }

    /// Builds a value from an integer count of minor units (pesewas).
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, Self::SCALE))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Money) -> Result<Money, LedgerError> {
        self.0
            .checked_add(other.0)
            .ok_or(LedgerError::InvalidAmount)
            .and_then(Money::rescaled)
    }

    pub fn checked_sub(self, other: Money) -> Result<Money, LedgerError> {
        self.0
            .checked_sub(other.0)
            .ok_or(LedgerError::InvalidAmount)
            .and_then(Money::rescaled)
    }

    /// Renders the amount the way the settlement network expects it:
    /// a plain string with two decimals.
    pub fn to_wire(&self) -> String {
        wire_amount(self.0)
    }

    /// Fails when the value is too large to carry two decimals.
    fn rescaled(mut value: Decimal) -> Result<Money, LedgerError> {
        value.rescale(Self::SCALE);
        if value.scale() != Self::SCALE {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(Money(value))
    }
}

/// Formats any decimal for the settlement network, rounding half-up to two
/// places. A [`Money`] is already exact at that scale and passes through
/// unchanged.
fn wire_amount(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(Money::SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(Money::SCALE);
    rounded.to_string()
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl TryFrom<Decimal> for Money {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| LedgerError::InvalidAmount)?;
        Money::new(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
