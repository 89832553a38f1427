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
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Offline stand-in for the mobile-money network.
///
/// Accepts every request after a short delay and returns a synthetic
/// gateway reference. Nothing ever leaves the process.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    delay: Duration,
}

impl SimulatedGateway {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    async fn accept(&self, prefix: &str, request: &SettlementRequest) -> ProvisionalSettlement {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let gateway_reference = format!("{prefix}{}", Uuid::new_v4().simple());
        tracing::info!(
            external_reference = %request.external_reference,
            %gateway_reference,
            amount = %request.amount,
            provider = %request.provider,
            "simulated settlement accepted"
        );
        ProvisionalSettlement::pending(request.external_reference.clone(), gateway_reference)
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl SettlementGateway for SimulatedGateway {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn request_inbound(
        &self,
        request: &SettlementRequest,
    ) -> Result<ProvisionalSettlement, LedgerError> {
        Ok(self.accept("MOCK_DEP_", request).await)
    }

    async fn request_outbound(
        &self,
        request: &SettlementRequest,
    ) -> Result<ProvisionalSettlement, LedgerError> {
        Ok(self.accept("MOCK_WD_", request).await)
    }
}
