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

//! Field extraction from settlement callbacks.
//!
//! The network wraps the interesting fields in a `Data` object on some
//! deliveries and sends them at the root on others. Unknown fields are
//! ignored.

use crate::LedgerError;
use crate::transaction::TransactionStatus;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

const REFERENCE_KEYS: [&str; 6] = [
    "ExternalId",
    "externalId",
    "TransactionId",
    "transactionId",
    "ClientReference",
    "clientReference",
];
const STATUS_KEYS: [&str; 2] = ["Status", "status"];
const AMOUNT_KEYS: [&str; 2] = ["Amount", "amount"];

/// Identifiers and figures pulled out of a callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackFields {
    pub external_reference: Option<String>,
    pub status: Option<String>,
    pub amount: Option<Decimal>,
}

impl CallbackFields {
    pub fn extract(payload: &Value) -> Self {
        let data = match payload.get("Data").or_else(|| payload.get("data")) {
            Some(data @ Value::Object(_)) => data,
            _ => payload,
        };
        Self {
            external_reference: first_text(data, &REFERENCE_KEYS),
            status: first_text(data, &STATUS_KEYS),
            amount: AMOUNT_KEYS
                .iter()
                .find_map(|key| data.get(*key))
                .and_then(parse_amount),
        }
    }

    /// The three fields reconciliation needs, or the first one missing.
    pub fn require(&self) -> Result<(&str, &str, Decimal), LedgerError> {
        let reference = self
            .external_reference
            .as_deref()
            .ok_or_else(|| LedgerError::MalformedPayload("missing external id".to_string()))?;
        let status = self
            .status
            .as_deref()
            .ok_or_else(|| LedgerError::MalformedPayload("missing status".to_string()))?;
        let amount = self
            .amount
            .ok_or_else(|| LedgerError::MalformedPayload("missing or invalid amount".to_string()))?;
        Ok((reference, status, amount))
    }
}

fn first_text(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Parses the reported amount exactly; never goes through `f64`.
fn parse_amount(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Maps the network's status vocabulary onto ours.
///
/// Unrecognised strings map to `Pending`, which never moves money.
pub fn map_status(reported: &str) -> TransactionStatus {
    match reported.trim().to_lowercase().as_str() {
        "completed" | "success" => TransactionStatus::Completed,
        "failed" => TransactionStatus::Failed,
        _ => TransactionStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn reads_nested_data_object() {
        let fields = CallbackFields::extract(&json!({
            "ResponseCode": "0000",
            "Data": {"ExternalId": "R1", "Status": "Success", "Amount": 30.0}
        }));
        assert_eq!(fields.external_reference.as_deref(), Some("R1"));
        assert_eq!(fields.status.as_deref(), Some("Success"));
        assert_eq!(fields.amount, Some(dec!(30.0)));
    }

    #[test]
    fn reads_root_object_with_fallback_keys() {
        let fields = CallbackFields::extract(&json!({
            "ClientReference": "R2",
            "status": "failed",
            "amount": "12.50",
            "unknown": {"nested": true}
        }));
        assert_eq!(fields.external_reference.as_deref(), Some("R2"));
        assert_eq!(fields.amount, Some(dec!(12.50)));
    }

    #[test]
    fn external_id_takes_precedence() {
        let fields = CallbackFields::extract(&json!({
            "TransactionId": "gw-9",
            "ExternalId": "R3",
        }));
        assert_eq!(fields.external_reference.as_deref(), Some("R3"));
    }

    #[test]
    fn amount_is_exact() {
        let fields = CallbackFields::extract(&json!({"Amount": "0.1"}));
        assert_eq!(fields.amount, Some(dec!(0.1)));
        let fields = CallbackFields::extract(&json!({"Amount": "thirty"}));
        assert_eq!(fields.amount, None);
    }

    #[test]
    fn require_reports_missing_field() {
        let fields = CallbackFields::extract(&json!({"ExternalId": "R1", "Amount": "1"}));
        assert_eq!(
            fields.require(),
            Err(LedgerError::MalformedPayload("missing status".into()))
        );
        let fields = CallbackFields::extract(&json!({"Status": "Success"}));
        assert!(matches!(fields.require(), Err(LedgerError::MalformedPayload(_))));
        let fields = CallbackFields::extract(&json!("not an object"));
        assert!(fields.require().is_err());
    }

    #[test]
    fn status_vocabulary() {
        assert_eq!(map_status("Success"), TransactionStatus::Completed);
        assert_eq!(map_status("completed"), TransactionStatus::Completed);
        assert_eq!(map_status("FAILED"), TransactionStatus::Failed);
        assert_eq!(map_status("pending"), TransactionStatus::Pending);
        assert_eq!(map_status("refunded"), TransactionStatus::Pending);
        assert_eq!(map_status(""), TransactionStatus::Pending);
    }
}
