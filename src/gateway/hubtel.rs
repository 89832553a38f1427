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

use super::{ProvisionalSettlement, SettlementGateway, SettlementRequest};
use crate::LedgerError;
use crate::config::GatewaySettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

const INBOUND_DESCRIPTION: &str = "Wallet deposit";
const OUTBOUND_DESCRIPTION: &str = "Wallet withdrawal";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReceiveBody<'a> {
    external_id: &'a str,
    amount: String,
    currency: &'a str,
    customer_phone_number: &'a str,
    provider: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Recipient<'a> {
    phone_number: &'a str,
    provider: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    external_id: &'a str,
    amount: String,
    currency: &'a str,
    recipient: Recipient<'a>,
    description: &'a str,
}

/// Live client for the Hubtel merchant-account API.
#[derive(Debug, Clone)]
pub struct HubtelGateway {
    client: Client,
    api_id: String,
    api_key: String,
    receive_url: String,
    send_url: String,
    currency: String,
}

impl HubtelGateway {
    pub fn new(settings: &GatewaySettings) -> Result<Self, LedgerError> {
        if !settings.has_credentials() {
            return Err(LedgerError::GatewayRequestFailed(
                "gateway credentials are not configured".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| LedgerError::GatewayRequestFailed(e.to_string()))?;
        let merchant = &settings.merchant_account;

        Ok(Self {
            client,
            api_id: settings.api_id.clone(),
            api_key: settings.api_key.clone(),
            receive_url: settings.receive_url.clone().unwrap_or_else(|| {
                format!("https://rmp.hubtel.com/merchantaccount/merchants/{merchant}/receive/mobilemoney")
            }),
            send_url: settings.send_url.clone().unwrap_or_else(|| {
                format!("https://smp.hubtel.com/api/merchants/{merchant}/send-mobilemoney")
            }),
            currency: settings.currency.clone(),
        })
    }

    /// Posts `body` and returns the parsed JSON response.
    async fn post<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<Value, LedgerError> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.api_id, Some(&self.api_key))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url, error = %e, "gateway request failed");
                if e.is_timeout() {
                    LedgerError::GatewayRequestFailed("request timed out".to_string())
                } else {
                    LedgerError::GatewayRequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable response body>".to_string());
            tracing::error!(url, status = status.as_u16(), body = %text, "gateway rejected request");
            return Err(LedgerError::GatewayRequestFailed(format!("HTTP {}", status.as_u16())));
        }

        // An empty or non-JSON 2xx body still counts as accepted.
        let text = response
            .text()
            .await
            .map_err(|e| LedgerError::GatewayRequestFailed(e.to_string()))?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

/// Reads the gateway's id for the request, falling back to our own reference.
fn gateway_reference(response: &Value, field: &str, fallback: &str) -> String {
    match response.get(field) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => fallback.to_string(),
    }
}

#[async_trait]
impl SettlementGateway for HubtelGateway {
    fn name(&self) -> &'static str {
        "hubtel"
    }

    async fn request_inbound(
        &self,
        request: &SettlementRequest,
    ) -> Result<ProvisionalSettlement, LedgerError> {
        let external_id = request.external_reference.as_str();
        let body = ReceiveBody {
            external_id,
            amount: request.amount.to_wire(),
            currency: &self.currency,
            customer_phone_number: &request.phone_number,
            provider: request.provider.code(),
            description: INBOUND_DESCRIPTION,
        };
        let response = self.post(&self.receive_url, &body).await?;
        let reference = gateway_reference(&response, "checkoutId", external_id);
        tracing::info!(external_id, gateway_reference = %reference, "deposit requested");
        Ok(ProvisionalSettlement::pending(
            request.external_reference.clone(),
            reference,
        ))
    }

    async fn request_outbound(
        &self,
        request: &SettlementRequest,
    ) -> Result<ProvisionalSettlement, LedgerError> {
        let external_id = request.external_reference.as_str();
        let body = SendBody {
            external_id,
            amount: request.amount.to_wire(),
            currency: &self.currency,
            recipient: Recipient {
                phone_number: &request.phone_number,
                provider: request.provider.code(),
            },
            description: OUTBOUND_DESCRIPTION,
        };
        let response = self.post(&self.send_url, &body).await?;
        let reference = gateway_reference(&response, "transactionId", external_id);
        tracing::info!(external_id, gateway_reference = %reference, "withdrawal requested");
        Ok(ProvisionalSettlement::pending(
            request.external_reference.clone(),
            reference,
        ))
    }
}
