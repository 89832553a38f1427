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

//! Phone number normalisation for the Ghanaian numbering plan.

use crate::LedgerError;

const COUNTRY_CODE: &str = "233";

/// Returns the number as digits with the `233` country code.
///
/// Non-digits are dropped, a leading trunk `0` is replaced by the country
/// code, and the country code is prefixed when missing.
///
/// ```
/// use groupsave_ledger::gateway::normalize_phone;
///
/// assert_eq!(normalize_phone("024 123 4567").unwrap(), "233241234567");
/// assert_eq!(normalize_phone("+233241234567").unwrap(), "233241234567");
/// ```
///
/// # Errors
///
/// [`LedgerError::InvalidPhoneNumber`] if no digits remain.
pub fn normalize_phone(input: &str) -> Result<String, LedgerError> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(LedgerError::InvalidPhoneNumber(format!("{input:?} has no digits")));
    }
    if let Some(local) = digits.strip_prefix('0') {
        return Ok(format!("{COUNTRY_CODE}{local}"));
    }
    if digits.starts_with(COUNTRY_CODE) {
        return Ok(digits);
    }
    Ok(format!("{COUNTRY_CODE}{digits}"))
}
