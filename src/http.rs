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

//! REST surface.
//!
//! ```bash
//! # Open a wallet for user 1 (stands in for the user service)
//! curl -X POST http://localhost:8001/api/users/1/wallet
//!
//! # Deposit from mobile money
//! curl -X POST http://localhost:8001/api/wallet/1/deposit \
//!   -H "Content-Type: application/json" \
//!   -d '{"phone_number": "0241234567", "amount": "50.00", "provider": "mtn"}'
//!
//! # Settlement callback
//! curl -X POST http://localhost:8001/api/wallet/hubtel/webhook \
//!   -H "X-Hubtel-Signature: <hex hmac>" \
//!   -d '{"Data": {"ExternalId": "...", "Status": "Success", "Amount": "50.00"}}'
//! ```

use crate::audit::AuditLog;
use crate::base::{GroupId, TransactionId, UserId};
use crate::config::Settings;
use crate::directory::Membership;
use crate::engine::{Engine, MobileMoneyRequest};
use crate::error::{PersistenceError, StartupError};
use crate::events::EventBus;
use crate::gateway::{self, SettlementGateway};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::persistence::Snapshot;
use crate::wallet::{WalletOwner, WalletSnapshot};
use crate::webhook::{CallbackOutcome, WebhookReconciler};
use crate::LedgerError;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const WEBHOOK_PATH: &str = "/api/wallet/hubtel/webhook";

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to_user_id: UserId,
    pub amount: Money,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContributionRequest {
    pub user_id: UserId,
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct DisbursementRequest {
    pub admin_id: UserId,
    pub recipient_id: UserId,
    pub amount: Money,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GroupWalletRequest {
    pub admin_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    #[serde(flatten)]
    pub wallet: WalletSnapshot,
    pub total: Money,
}

impl TryFrom<WalletSnapshot> for WalletResponse {
    type Error = LedgerError;

    fn try_from(wallet: WalletSnapshot) -> Result<Self, Self::Error> {
        let total = wallet.total()?;
        Ok(Self { wallet, total })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub reconciler: Arc<WebhookReconciler>,
    pub membership: Arc<Membership>,
    pub audit: Arc<AuditLog>,
    signature_header: Arc<str>,
    snapshot_path: Option<PathBuf>,
    persist_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(
        ledger: Arc<Ledger>,
        audit: Arc<AuditLog>,
        gateway: Arc<dyn SettlementGateway>,
        settings: &Settings,
    ) -> Self {
        let membership = Arc::new(Membership::new());
        let events = Arc::new(EventBus::new());
        let webhook = &settings.webhook;
        if webhook.secret().is_none() {
            tracing::warn!("webhook secret not configured, callback signatures are not enforced");
        }
        let reconciler = WebhookReconciler::new(
            Arc::clone(&ledger),
            Arc::clone(&audit),
            Arc::clone(&events),
            webhook.secret(),
        )
        .with_mismatch_threshold(webhook.mismatch_alert_threshold);
        let engine = Engine::new(ledger, gateway, membership.clone(), events);

        Self {
            engine: Arc::new(engine),
            reconciler: Arc::new(reconciler),
            membership,
            audit,
            signature_header: Arc::from(webhook.signature_header.as_str()),
            snapshot_path: settings.storage.snapshot_path.clone(),
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Restores persisted state and picks a gateway from the settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, StartupError> {
        let snapshot = match &settings.storage.snapshot_path {
            Some(path) => Snapshot::load_or_default(path)?,
            None => Snapshot::default(),
        };
        let (ledger, audit) = snapshot.restore()?;
        tracing::info!(
            wallets = snapshot.ledger.wallets.len(),
            transactions = snapshot.ledger.transactions.len(),
            audit_events = snapshot.audit_events.len(),
            "ledger state restored"
        );
        let gateway = gateway::from_settings(&settings.gateway)?;
        Ok(Self::new(Arc::new(ledger), Arc::new(audit), gateway, settings))
    }

    fn ledger(&self) -> &Arc<Ledger> {
        self.engine.ledger()
    }

    /// Writes the snapshot if one is configured.
    ///
    /// A failure means the change just made lives only in memory; callers
    /// must not acknowledge it as durable.
    async fn persist(&self) -> Result<(), PersistenceError> {
        let Some(path) = self.snapshot_path.clone() else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;
        let ledger = Arc::clone(self.ledger());
        let audit = Arc::clone(&self.audit);
        tokio::task::spawn_blocking(move || Snapshot::capture(&ledger, &audit).save(&path))
            .await
            .map_err(|e| PersistenceError::Io(std::io::Error::other(e)))?
            .inspect_err(|e| {
                tracing::error!(alert = "snapshot_failed", error = %e, "failed to write ledger snapshot");
            })
    }
}

// === Error Handling ===

/// Failures a handler can answer with.
#[derive(Debug)]
pub enum AppError {
    Ledger(LedgerError),
    /// The change was applied in memory but could not be written out.
    Persistence(PersistenceError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl From<PersistenceError> for AppError {
    fn from(err: PersistenceError) -> Self {
        AppError::Persistence(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::Ledger(err) => err,
            AppError::Persistence(_) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse {
                        error: "state could not be persisted".to_string(),
                        code: "PERSISTENCE_FAILED".to_string(),
                    }),
                )
                    .into_response();
            }
        };
        let status = match &err {
            LedgerError::InvalidAmount
            | LedgerError::SameWallet
            | LedgerError::MalformedPayload(_)
            | LedgerError::InvalidPhoneNumber(_)
            | LedgerError::UnsupportedProvider(_)
            | LedgerError::SignatureInvalid => StatusCode::BAD_REQUEST,
            LedgerError::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::WalletNotFound | LedgerError::TransactionNotFound => StatusCode::NOT_FOUND,
            LedgerError::DuplicateWallet
            | LedgerError::DuplicateReference
            | LedgerError::AmountMismatch { .. }
            | LedgerError::InvalidState(_) => StatusCode::CONFLICT,
            LedgerError::NotPermitted(_) => StatusCode::FORBIDDEN,
            LedgerError::GatewayRequestFailed(_) => StatusCode::BAD_GATEWAY,
        };

        (
            status,
            Json(ErrorResponse {
                error: err.to_string(),
                code: err.code().to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /api/wallet/hubtel/webhook
///
/// Answers 200 for every business outcome so the network stops retrying,
/// and 400 only when the signature fails. If the outcome could not be made
/// durable it answers 503 so the network redelivers; finalize is idempotent.
/// Internal detail never leaks.
async fn settlement_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(state.signature_header.as_ref())
        .and_then(|value| value.to_str().ok());
    let result = state.reconciler.handle_raw(&body, signature);
    if state.persist().await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"success": false, "reason": "temporarily unavailable"})),
        )
            .into_response();
    }

    let (status, body) = match result {
        Ok(CallbackOutcome::Applied(tx)) => (
            StatusCode::OK,
            json!({"success": true, "transaction_id": tx.id, "status": tx.status}),
        ),
        Ok(CallbackOutcome::NoChange(tx)) => (
            StatusCode::OK,
            json!({"success": true, "message": "no change", "transaction_id": tx.id}),
        ),
        Ok(CallbackOutcome::NotFound { .. }) => (
            StatusCode::OK,
            json!({"success": false, "reason": "transaction not found"}),
        ),
        Err(LedgerError::SignatureInvalid) => (
            StatusCode::BAD_REQUEST,
            json!({"success": false, "reason": "invalid signature"}),
        ),
        Err(LedgerError::MalformedPayload(_)) => (
            StatusCode::OK,
            json!({"success": false, "reason": "missing required fields"}),
        ),
        Err(_) => (
            StatusCode::OK,
            json!({"success": false, "reason": "rejected"}),
        ),
    };
    (status, Json(body)).into_response()
}

/// GET /api/wallet/{user_id}
async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Json<WalletResponse>, AppError> {
    let ledger = state.ledger();
    let id = ledger
        .wallet_for(WalletOwner::User(UserId(user_id)))
        .ok_or(LedgerError::WalletNotFound)?;
    Ok(Json(WalletResponse::try_from(ledger.wallet(id)?.snapshot())?))
}

/// POST /api/wallet/{user_id}/deposit
async fn deposit(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Json(request): Json<MobileMoneyRequest>,
) -> Result<Response, AppError> {
    let tx = state.engine.deposit(UserId(user_id), request).await?;
    state.persist().await?;
    Ok((StatusCode::ACCEPTED, Json(tx)).into_response())
}

/// POST /api/wallet/{user_id}/withdraw
async fn withdraw(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Json(request): Json<MobileMoneyRequest>,
) -> Result<Response, AppError> {
    let tx = state.engine.withdraw(UserId(user_id), request).await?;
    state.persist().await?;
    Ok((StatusCode::ACCEPTED, Json(tx)).into_response())
}

/// POST /api/wallet/{user_id}/transfer
async fn transfer(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Json(request): Json<TransferRequest>,
) -> Result<Response, AppError> {
    let tx = state.engine.transfer(
        UserId(user_id),
        request.to_user_id,
        request.amount,
        request.description,
    )?;
    state.persist().await?;
    Ok((StatusCode::CREATED, Json(tx)).into_response())
}

/// POST /api/groups/{group_id}/contribute
async fn contribute(
    State(state): State<AppState>,
    Path(group_id): Path<u64>,
    Json(request): Json<ContributionRequest>,
) -> Result<Response, AppError> {
    let tx = state
        .engine
        .contribute(request.user_id, GroupId(group_id), request.amount)?;
    state.persist().await?;
    Ok((StatusCode::CREATED, Json(tx)).into_response())
}

/// POST /api/groups/{group_id}/disburse
async fn disburse(
    State(state): State<AppState>,
    Path(group_id): Path<u64>,
    Json(request): Json<DisbursementRequest>,
) -> Result<Response, AppError> {
    let tx = state.engine.disburse(
        request.admin_id,
        GroupId(group_id),
        request.recipient_id,
        request.amount,
        request.description,
    )?;
    state.persist().await?;
    Ok((StatusCode::CREATED, Json(tx)).into_response())
}

/// GET /api/transactions/{id}
async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, AppError> {
    let view = state
        .ledger()
        .settlement_view(TransactionId(id))
        .ok_or(LedgerError::TransactionNotFound)?;
    Ok(Json(json!({
        "transaction": view.transaction,
        "wallets": view.wallets,
    })))
}

/// POST /api/users/{user_id}/wallet
async fn open_user_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Response, AppError> {
    let ledger = state.ledger();
    let id = ledger.open_wallet(WalletOwner::User(UserId(user_id)))?;
    let wallet = WalletResponse::try_from(ledger.wallet(id)?.snapshot())?;
    state.persist().await?;
    Ok((StatusCode::CREATED, Json(wallet)).into_response())
}

/// POST /api/groups/{group_id}/wallet
async fn open_group_wallet(
    State(state): State<AppState>,
    Path(group_id): Path<u64>,
    Json(request): Json<GroupWalletRequest>,
) -> Result<Response, AppError> {
    let group = GroupId(group_id);
    let ledger = state.ledger();
    let id = ledger.open_wallet(WalletOwner::Group(group))?;
    state.membership.add_admin(group, request.admin_id);
    let wallet = WalletResponse::try_from(ledger.wallet(id)?.snapshot())?;
    state.persist().await?;
    Ok((StatusCode::CREATED, Json(wallet)).into_response())
}

/// POST /api/groups/{group_id}/members
async fn add_member(
    State(state): State<AppState>,
    Path(group_id): Path<u64>,
    Json(request): Json<MemberRequest>,
) -> StatusCode {
    let group = GroupId(group_id);
    if request.admin {
        state.membership.add_admin(group, request.user_id);
    } else {
        state.membership.add_member(group, request.user_id);
    }
    StatusCode::NO_CONTENT
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(WEBHOOK_PATH, post(settlement_callback))
        .route("/api/wallet/{user_id}", get(get_wallet))
        .route("/api/wallet/{user_id}/deposit", post(deposit))
        .route("/api/wallet/{user_id}/withdraw", post(withdraw))
        .route("/api/wallet/{user_id}/transfer", post(transfer))
        .route("/api/groups/{group_id}/contribute", post(contribute))
        .route("/api/groups/{group_id}/disburse", post(disburse))
        .route("/api/groups/{group_id}/wallet", post(open_group_wallet))
        .route("/api/groups/{group_id}/members", post(add_member))
        .route("/api/transactions/{id}", get(get_transaction))
        .route("/api/users/{user_id}/wallet", post(open_user_wallet))
        .with_state(state)
}

/// Serves until `shutdown` resolves, then writes a final snapshot.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), StartupError> {
    let app = router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    if let Err(e) = state.persist().await {
        tracing::error!(error = %e, "final snapshot not written");
    }
    tracing::info!("server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn error_mapping() {
        let response = AppError::Ledger(LedgerError::InsufficientFunds).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["code"], "INSUFFICIENT_FUNDS");
        assert_eq!(json["error"], "insufficient available funds");

        let response = AppError::Ledger(LedgerError::GatewayRequestFailed("HTTP 500".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let response = AppError::Ledger(LedgerError::NotPermitted("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn persistence_failure_hides_detail() {
        let err = PersistenceError::Io(std::io::Error::other("disk full at /var/lib/x"));
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["code"], "PERSISTENCE_FAILED");
        assert_eq!(json["error"], "state could not be persisted");
    }

    #[test]
    fn wallet_response_adds_total() {
        let wallet = crate::wallet::Wallet::new(
            crate::base::WalletId(1),
            WalletOwner::User(UserId(1)),
        );
        let response = WalletResponse::try_from(wallet.snapshot()).unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["total"], "0.00");
        assert_eq!(json["balance"], "0.00");
        assert_eq!(json["owner"]["kind"], "user");
    }
}
