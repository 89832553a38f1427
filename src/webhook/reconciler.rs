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

use super::payload::{CallbackFields, map_status};
use super::signature::verify_signature;
use crate::LedgerError;
use crate::audit::{AuditEntry, AuditLog};
use crate::events::{EventBus, LedgerEvent};
use crate::ledger::{Finalized, Ledger};
use crate::transaction::Transaction;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

/// Business result of a callback that passed authentication and parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The transaction moved to the reported status.
    Applied(Transaction),
    /// Re-delivery; the transaction already had the reported status.
    NoChange(Transaction),
    /// No transaction carries this reference.
    NotFound { external_reference: String },
}

/// Turns settlement callbacks into ledger finalizations.
///
/// Every callback is audited first, whatever happens next.
pub struct WebhookReconciler {
    ledger: Arc<Ledger>,
    audit: Arc<AuditLog>,
    events: Arc<EventBus>,
    secret: Option<Vec<u8>>,
    mismatch_threshold: u32,
    mismatches: DashMap<String, u32>,
}

impl WebhookReconciler {
    pub fn new(
        ledger: Arc<Ledger>,
        audit: Arc<AuditLog>,
        events: Arc<EventBus>,
        secret: Option<&str>,
    ) -> Self {
        Self {
            ledger,
            audit,
            events,
            secret: secret.map(|s| s.as_bytes().to_vec()),
            mismatch_threshold: 3,
            mismatches: DashMap::new(),
        }
    }

    /// Mismatching deliveries per reference before escalation.
    pub fn with_mismatch_threshold(mut self, threshold: u32) -> Self {
        self.mismatch_threshold = threshold.max(1);
        self
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Parses `raw_body` as JSON and reconciles it.
    pub fn handle_raw(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<CallbackOutcome, LedgerError> {
        let parsed = serde_json::from_slice::<Value>(raw_body).ok();
        self.handle_callback(raw_body, signature, parsed.as_ref())
    }

    /// Reconciles one callback.
    ///
    /// `payload` is `None` when the body was not JSON; it is still audited.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SignatureInvalid`] - secret configured and the
    ///   signature is missing or wrong.
    /// - [`LedgerError::MalformedPayload`] - reference, status or amount
    ///   missing.
    /// - [`LedgerError::AmountMismatch`] - reported amount differs.
    /// - [`LedgerError::InvalidState`] - illegal transition.
    pub fn handle_callback(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        payload: Option<&Value>,
    ) -> Result<CallbackOutcome, LedgerError> {
        let signature_valid = self
            .secret
            .as_deref()
            .is_some_and(|secret| verify_signature(secret, raw_body, signature));
        let enforced = self.secret.is_some();

        let fields = payload.map(CallbackFields::extract).unwrap_or_default();
        let required = fields.require();
        let transaction_id = fields
            .external_reference
            .as_deref()
            .and_then(|reference| self.ledger.transactions().id_for_reference(reference));

        let processing_error = if enforced && !signature_valid {
            Some(LedgerError::SignatureInvalid.to_string())
        } else {
            required.as_ref().err().map(ToString::to_string)
        };

        let audit_id = self.audit.append(AuditEntry {
            payload: payload
                .cloned()
                .unwrap_or_else(|| Value::String(String::from_utf8_lossy(raw_body).into_owned())),
            signature_valid,
            external_reference: fields.external_reference.clone(),
            transaction_id,
            reported_status: fields.status.clone(),
            processing_error,
        });

        if enforced && !signature_valid {
            tracing::warn!(
                audit_id = %audit_id,
                signature_present = signature.is_some(),
                "callback rejected: invalid signature"
            );
            return Err(LedgerError::SignatureInvalid);
        }

        let (reference, reported_status, amount) = required.inspect_err(|e| {
            tracing::warn!(audit_id = %audit_id, error = %e, "callback rejected: malformed payload");
        })?;
        let status = map_status(reported_status);

        let Some(id) = transaction_id else {
            tracing::info!(audit_id = %audit_id, reference, "callback for unknown transaction");
            return Ok(CallbackOutcome::NotFound {
                external_reference: reference.to_string(),
            });
        };

        match self.ledger.finalize(id, status, amount) {
            Ok(Finalized::Applied(transaction)) => {
                self.audit.mark_processed(audit_id);
                tracing::info!(
                    audit_id = %audit_id,
                    transaction_id = %transaction.id,
                    kind = %transaction.kind,
                    status = %transaction.status,
                    amount = %transaction.amount,
                    "transaction finalized"
                );
                self.events.publish(LedgerEvent::TransactionFinalized {
                    id: transaction.id,
                    kind: transaction.kind,
                    status: transaction.status,
                    amount: transaction.amount,
                });
                Ok(CallbackOutcome::Applied(transaction))
            }
            Ok(Finalized::Unchanged(transaction)) => {
                self.audit.mark_processed(audit_id);
                tracing::debug!(audit_id = %audit_id, transaction_id = %id, "callback re-delivery, no change");
                Ok(CallbackOutcome::NoChange(transaction))
            }
            Err(LedgerError::TransactionNotFound) => Ok(CallbackOutcome::NotFound {
                external_reference: reference.to_string(),
            }),
            Err(LedgerError::AmountMismatch { expected, reported }) => {
                self.record_mismatch(reference, expected, reported);
                Err(LedgerError::AmountMismatch { expected, reported })
            }
            Err(e) => {
                tracing::error!(
                    alert = "reconciliation_failed",
                    audit_id = %audit_id,
                    transaction_id = %id,
                    reference,
                    error = %e,
                    "callback could not be applied"
                );
                Err(e)
            }
        }
    }

    fn record_mismatch(&self, reference: &str, expected: Decimal, reported: Decimal) {
        let occurrences = {
            let mut count = self.mismatches.entry(reference.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        tracing::error!(
            alert = "amount_mismatch",
            reference,
            %expected,
            %reported,
            occurrences,
            "callback amount does not match recorded transaction"
        );
        if occurrences == self.mismatch_threshold {
            tracing::error!(
                alert = "amount_mismatch_escalation",
                reference,
                occurrences,
                "repeated amount mismatches for one reference, escalating"
            );
            self.events.publish(LedgerEvent::AmountMismatch {
                external_reference: reference.to_string(),
                expected,
                reported,
                occurrences,
            });
        }
    }

    /// Mismatching deliveries seen so far for `reference`.
    pub fn mismatch_count(&self, reference: &str) -> u32 {
        self.mismatches.get(reference).map_or(0, |count| *count)
    }
}
