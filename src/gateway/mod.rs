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

//! Settlement gateway clients.
//!
//! A gateway only ever *requests* money movement. Every successful call
//! yields a [`ProvisionalSettlement`] whose status is `Pending`; the final
//! outcome arrives later through the webhook reconciler.

mod hubtel;
mod phone;
mod provider;
mod simulated;

pub use hubtel::HubtelGateway;
pub use phone::normalize_phone;
pub use provider::ProviderCode;
pub use simulated::SimulatedGateway;

use crate::LedgerError;
use crate::base::ExternalReference;
use crate::config::GatewaySettings;
use crate::money::Money;
use crate::transaction::TransactionStatus;
use async_trait::async_trait;
use std::sync::Arc;

/// One money-movement request sent to the mobile-money network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    pub external_reference: ExternalReference,
    /// Normalised msisdn, see [`normalize_phone`].
    pub phone_number: String,
    pub amount: Money,
    pub provider: ProviderCode,
}

impl SettlementRequest {
    /// Builds a request from user-entered phone and provider strings.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnsupportedProvider`] - unknown network name.
    /// - [`LedgerError::InvalidPhoneNumber`] - phone number has no digits.
    /// - [`LedgerError::InvalidAmount`] - non-positive amount.
    pub fn new(
        external_reference: ExternalReference,
        phone_number: &str,
        amount: Money,
        provider: &str,
    ) -> Result<Self, LedgerError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(Self {
            external_reference,
            phone_number: normalize_phone(phone_number)?,
            amount,
            provider: ProviderCode::normalize(provider)?,
        })
    }
}

/// Gateway acknowledgement of an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalSettlement {
    pub external_reference: ExternalReference,
    /// The gateway's own id for the request.
    pub gateway_reference: String,
    /// Always [`TransactionStatus::Pending`].
    pub status: TransactionStatus,
}

impl ProvisionalSettlement {
    pub fn pending(external_reference: ExternalReference, gateway_reference: impl Into<String>) -> Self {
        Self {
            external_reference,
            gateway_reference: gateway_reference.into(),
            status: TransactionStatus::Pending,
        }
    }
}

/// Client for the external mobile-money network.
///
/// Failures (transport, timeout, non-2xx) are returned as
/// [`LedgerError::GatewayRequestFailed`]; callers must not record a
/// transaction in that case.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Collects funds from a customer's mobile-money wallet (deposit).
    async fn request_inbound(
        &self,
        request: &SettlementRequest,
    ) -> Result<ProvisionalSettlement, LedgerError>;

    /// Pays funds out to a customer's mobile-money wallet (withdrawal).
    async fn request_outbound(
        &self,
        request: &SettlementRequest,
    ) -> Result<ProvisionalSettlement, LedgerError>;
}

/// Picks the live gateway when credentials are present, the simulator
/// otherwise.
pub fn from_settings(settings: &GatewaySettings) -> Result<Arc<dyn SettlementGateway>, LedgerError> {
    if settings.use_simulator {
        tracing::info!("using simulated settlement gateway");
        return Ok(Arc::new(SimulatedGateway::new(settings.simulated_delay())));
    }
    if !settings.has_credentials() {
        tracing::warn!("gateway credentials missing, falling back to simulated settlement gateway");
        return Ok(Arc::new(SimulatedGateway::new(settings.simulated_delay())));
    }
    Ok(Arc::new(HubtelGateway::new(settings)?))
}
