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

//! Integration tests for the REST API and the settlement webhook.
//!
//! A real server is bound to an ephemeral port and driven over HTTP, with
//! the simulated gateway standing in for the mobile-money network.

use groupsave_ledger::http::{self, AppState, WEBHOOK_PATH};
use groupsave_ledger::webhook::sign;
use groupsave_ledger::{
    AuditLog, Ledger, Money, Settings, SimulatedGateway, Snapshot, TransactionStatus, UserId,
    WalletOwner,
};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

const SECRET: &str = "whsec_server_test";

/// Test server that binds to an ephemeral port.
struct TestServer {
    base_url: String,
    ledger: Arc<Ledger>,
    audit: Arc<AuditLog>,
    client: Client,
}

impl TestServer {
    async fn new() -> Self {
        Self::with_snapshot(None).await
    }

    async fn with_snapshot(snapshot_path: Option<PathBuf>) -> Self {
        let mut settings = Settings::default();
        settings.webhook.secret = Some(SECRET.to_string());
        settings.storage.snapshot_path = snapshot_path;

        let ledger = Arc::new(Ledger::new());
        let audit = Arc::new(AuditLog::new());
        let state = AppState::new(
            Arc::clone(&ledger),
            Arc::clone(&audit),
            Arc::new(SimulatedGateway::new(Duration::ZERO)),
            &settings,
        );

        let app = http::router(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to be ready by polling with retries
        let client = Client::new();
        let health_url = format!("{}/health", base_url);
        for _ in 0..50 {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }

        TestServer {
            base_url,
            ledger,
            audit,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    /// Opens a wallet for `user` and funds it directly.
    async fn user(&self, user: u64, balance: &str) {
        let (status, _) = self.post(&format!("/api/users/{user}/wallet"), json!({})).await;
        assert_eq!(status, StatusCode::CREATED);
        let amount: Money = balance.parse().unwrap();
        if !amount.is_zero() {
            let id = self.ledger.wallet_for(WalletOwner::User(UserId(user))).unwrap();
            self.ledger.adjust_balance(id, amount).unwrap();
        }
    }

    async fn callback(&self, body: Value, signature: Option<&str>) -> (StatusCode, Value) {
        let raw = body.to_string();
        let signature = match signature {
            Some(signature) => signature.to_string(),
            None => sign(SECRET.as_bytes(), raw.as_bytes()).unwrap(),
        };
        let response = self
            .client
            .post(self.url(WEBHOOK_PATH))
            .header("Content-Type", "application/json")
            .header("X-Hubtel-Signature", signature)
            .body(raw)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }
}

fn momo(amount: &str) -> Value {
    json!({"phone_number": "024 123 4567", "amount": amount, "provider": "mtn"})
}

fn settlement(reference: &str, status: &str, amount: &str) -> Value {
    json!({
        "ResponseCode": "0000",
        "Data": {"ExternalId": reference, "Status": status, "Amount": amount}
    })
}

/// A snapshot path inside a per-test scratch directory, created or not.
fn scratch_snapshot(name: &str, create_dir: bool) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("groupsave-server-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    if create_dir {
        std::fs::create_dir_all(&dir).unwrap();
    }
    dir.join("ledger.json")
}

// === Tests ===

#[tokio::test]
async fn deposit_then_signed_callback_credits_wallet() {
    let server = TestServer::new().await;
    server.user(1, "0").await;

    let (status, tx) = server.post("/api/wallet/1/deposit", momo("50.00")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(tx["type"], "deposit");
    assert_eq!(tx["status"], "pending");
    assert_eq!(tx["phone_number"], "233241234567");
    assert_eq!(tx["provider"], "mtn");
    let reference = tx["external_reference"].as_str().unwrap().to_string();

    let (_, wallet) = server.get("/api/wallet/1").await;
    assert_eq!(wallet["balance"], "0.00");

    let (status, body) = server
        .callback(settlement(&reference, "Success", "50.00"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "completed");

    let (status, wallet) = server.get("/api/wallet/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["balance"], "50.00");
    assert_eq!(wallet["locked_balance"], "0.00");
    assert_eq!(wallet["total"], "50.00");

    // Re-delivery is acknowledged without another credit.
    let (status, body) = server
        .callback(settlement(&reference, "Success", "50.00"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "no change");
    let (_, wallet) = server.get("/api/wallet/1").await;
    assert_eq!(wallet["balance"], "50.00");
}

#[tokio::test]
async fn withdrawal_locks_until_settled() {
    let server = TestServer::new().await;
    server.user(1, "100.00").await;

    let (status, tx) = server.post("/api/wallet/1/withdraw", momo("30.00")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = tx["id"].as_u64().unwrap();
    let reference = tx["external_reference"].as_str().unwrap().to_string();

    let (_, view) = server.get(&format!("/api/transactions/{id}")).await;
    assert_eq!(view["transaction"]["status"], "pending");
    assert_eq!(view["wallets"][0]["balance"], "70.00");
    assert_eq!(view["wallets"][0]["locked_balance"], "30.00");

    let (_, body) = server
        .callback(settlement(&reference, "Failed", "30.00"), None)
        .await;
    assert_eq!(body["status"], "failed");

    let (_, view) = server.get(&format!("/api/transactions/{id}")).await;
    assert_eq!(view["transaction"]["status"], "failed");
    assert_eq!(view["wallets"][0]["balance"], "100.00");
    assert_eq!(view["wallets"][0]["locked_balance"], "0.00");
}

#[tokio::test]
async fn bad_signature_is_rejected_but_audited() {
    let server = TestServer::new().await;
    server.user(1, "100.00").await;
    let (_, tx) = server.post("/api/wallet/1/withdraw", momo("30.00")).await;
    let reference = tx["external_reference"].as_str().unwrap().to_string();

    let (status, body) = server
        .callback(settlement(&reference, "Success", "30.00"), Some("00ff"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "reason": "invalid signature"}));

    assert_eq!(server.audit.len(), 1);
    let event = &server.audit.all()[0];
    assert!(!event.signature_valid);
    assert!(!event.processed);

    let id = server.ledger.transaction_by_reference(&reference).unwrap().id;
    assert_eq!(
        server.ledger.transaction(id).unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn callback_business_failures_answer_ok() {
    let server = TestServer::new().await;
    server.user(1, "100.00").await;
    let (_, tx) = server.post("/api/wallet/1/withdraw", momo("30.00")).await;
    let reference = tx["external_reference"].as_str().unwrap().to_string();

    let (status, body) = server
        .callback(settlement("unknown-ref", "Success", "1.00"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reason"], "transaction not found");

    let (status, body) = server
        .callback(json!({"Data": {"Status": "Success"}}), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reason"], "missing required fields");

    let (status, body) = server
        .callback(settlement(&reference, "Success", "31.00"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["reason"], "rejected");

    assert_eq!(server.audit.len(), 3);
    let (_, wallet) = server.get("/api/wallet/1").await;
    assert_eq!(wallet["locked_balance"], "30.00");
}

#[tokio::test]
async fn transfer_and_error_codes() {
    let server = TestServer::new().await;
    server.user(1, "40.00").await;
    server.user(2, "0").await;

    let (status, tx) = server
        .post(
            "/api/wallet/1/transfer",
            json!({"to_user_id": 2, "amount": "25.50", "description": "rent"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tx["status"], "completed");
    assert_eq!(tx["description"], "rent");

    let (status, body) = server
        .post("/api/wallet/1/transfer", json!({"to_user_id": 2, "amount": "100.00"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");

    let (status, body) = server
        .post("/api/wallet/1/transfer", json!({"to_user_id": 1, "amount": "1.00"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SAME_WALLET");

    let (status, body) = server
        .post("/api/wallet/1/transfer", json!({"to_user_id": 9, "amount": "1.00"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "WALLET_NOT_FOUND");

    let (status, body) = server.post("/api/wallet/1/deposit", momo("0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_AMOUNT");

    let (status, body) = server
        .post(
            "/api/wallet/1/deposit",
            json!({"phone_number": "0241234567", "amount": "5.00", "provider": "carrier pigeon"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNSUPPORTED_PROVIDER");

    let (status, body) = server.post("/api/users/1/wallet", json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_WALLET");

    let (status, _) = server.get("/api/transactions/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, a) = server.get("/api/wallet/1").await;
    let (_, b) = server.get("/api/wallet/2").await;
    assert_eq!(a["balance"], "14.50");
    assert_eq!(b["balance"], "25.50");
}

#[tokio::test]
async fn group_contributions_and_disbursement() {
    let server = TestServer::new().await;
    server.user(1, "100.00").await;
    server.user(2, "100.00").await;
    server.user(3, "100.00").await;

    let (status, pool) = server
        .post("/api/groups/5/wallet", json!({"admin_id": 1}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(pool["owner"], json!({"kind": "group", "id": 5}));

    let (status, _) = server
        .post("/api/groups/5/members", json!({"user_id": 2}))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for user in [1, 2] {
        let (status, tx) = server
            .post("/api/groups/5/contribute", json!({"user_id": user, "amount": "20.00"}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(tx["type"], "contribution");
    }

    // Not a member.
    let (status, body) = server
        .post("/api/groups/5/contribute", json!({"user_id": 3, "amount": "20.00"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_PERMITTED");

    // Members cannot disburse.
    let (status, _) = server
        .post(
            "/api/groups/5/disburse",
            json!({"admin_id": 2, "recipient_id": 2, "amount": "40.00"}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, tx) = server
        .post(
            "/api/groups/5/disburse",
            json!({"admin_id": 1, "recipient_id": 2, "amount": "40.00", "description": "payout"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tx["type"], "disbursement");

    let (_, member) = server.get("/api/wallet/2").await;
    assert_eq!(member["balance"], "120.00");
    let pool_id = server.ledger.wallet_for(WalletOwner::Group(groupsave_ledger::GroupId(5))).unwrap();
    assert_eq!(server.ledger.wallet(pool_id).unwrap().balance(), Money::ZERO);
}

/// Many concurrent transfers between two wallets over HTTP conserve funds.
#[tokio::test]
async fn concurrent_opposing_transfers() {
    let server = TestServer::new().await;
    server.user(1, "500.00").await;
    server.user(2, "500.00").await;

    const REQUESTS: usize = 200;
    let start = Instant::now();

    let mut handles = Vec::with_capacity(REQUESTS);
    for i in 0..REQUESTS {
        let client = server.client.clone();
        let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
        let url = server.url(&format!("/api/wallet/{from}/transfer"));
        handles.push(tokio::spawn(async move {
            client
                .post(&url)
                .json(&json!({"to_user_id": to, "amount": "3.00"}))
                .send()
                .await
                .unwrap()
                .status()
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles).await;
    let successful = results
        .iter()
        .filter(|r| r.as_ref().unwrap().is_success())
        .count();
    println!("Processed {} transfers in {:?}", REQUESTS, start.elapsed());
    assert_eq!(successful, REQUESTS);

    let (_, a) = server.get("/api/wallet/1").await;
    let (_, b) = server.get("/api/wallet/2").await;
    assert_eq!(a["balance"], "500.00");
    assert_eq!(b["balance"], "500.00");
}

/// Concurrent withdrawals and their callbacks through the full HTTP stack.
#[tokio::test]
#[ignore = "heavy; run with --ignored"]
async fn stress_withdrawals_and_callbacks() {
    let server = Arc::new(TestServer::new().await);
    server.user(1, "1000.00").await;

    const REQUESTS: usize = 500;
    let mut handles = Vec::with_capacity(REQUESTS);
    for _ in 0..REQUESTS {
        let server = Arc::clone(&server);
        handles.push(tokio::spawn(async move {
            let (status, tx) = server.post("/api/wallet/1/withdraw", momo("1.00")).await;
            assert_eq!(status, StatusCode::ACCEPTED);
            let reference = tx["external_reference"].as_str().unwrap().to_string();
            let (status, body) = server
                .callback(settlement(&reference, "Success", "1.00"), None)
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], true);
        }));
    }
    for result in futures::future::join_all(handles).await {
        result.unwrap();
    }

    let (_, wallet) = server.get("/api/wallet/1").await;
    assert_eq!(wallet["balance"], "500.00");
    assert_eq!(wallet["locked_balance"], "0.00");
    assert_eq!(server.audit.len(), REQUESTS);
}

#[tokio::test]
async fn unusable_phone_number_is_a_request_error() {
    let server = TestServer::new().await;
    server.user(1, "0").await;

    let (status, body) = server
        .post(
            "/api/wallet/1/deposit",
            json!({"phone_number": "n/a", "amount": "5.00", "provider": "mtn"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PHONE_NUMBER");
    assert!(server.ledger.transactions().is_empty());
}

#[tokio::test]
async fn settled_callback_is_durable_before_ok() {
    let path = scratch_snapshot("durable", true);
    let server = TestServer::with_snapshot(Some(path.clone())).await;
    server.user(1, "0").await;

    let (status, tx) = server.post("/api/wallet/1/deposit", momo("50.00")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let reference = tx["external_reference"].as_str().unwrap().to_string();

    let (status, body) = server
        .callback(settlement(&reference, "Success", "50.00"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // What was acknowledged is what a restart brings back.
    let (ledger, audit) = Snapshot::load(&path).unwrap().restore().unwrap();
    let settled = ledger.transaction_by_reference(&reference).unwrap();
    assert_eq!(settled.status, TransactionStatus::Completed);
    let wallet = ledger.wallet_for(WalletOwner::User(UserId(1))).unwrap();
    assert_eq!(ledger.wallet(wallet).unwrap().balance(), Money::from_minor(5_000));
    assert_eq!(audit.len(), 1);
    assert!(audit.all()[0].processed);
}

#[tokio::test]
async fn failed_snapshot_is_never_acknowledged() {
    // Parent directory does not exist, so every write fails.
    let path = scratch_snapshot("unwritable", false);
    let server = TestServer::with_snapshot(Some(path.clone())).await;
    let wallet = server.ledger.open_wallet(WalletOwner::User(UserId(1))).unwrap();
    server.ledger.adjust_balance(wallet, Money::from_minor(1_000)).unwrap();

    let (status, body) = server.post("/api/wallet/1/deposit", momo("50.00")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "PERSISTENCE_FAILED");
    let reference = server.ledger.transactions().all()[0]
        .external_reference
        .clone()
        .unwrap();

    // The callback is applied in memory but answered 5xx so the network
    // delivers it again.
    let callback = settlement(reference.as_str(), "Success", "50.00");
    let (status, body) = server.callback(callback.clone(), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"success": false, "reason": "temporarily unavailable"}));

    // Redelivery is safe: the wallet is credited once.
    let (status, _) = server.callback(callback, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        server.ledger.wallet(wallet).unwrap().balance(),
        Money::from_minor(6_000)
    );
    assert_eq!(server.audit.len(), 2);

    let (status, body) = server
        .post("/api/wallet/1/transfer", json!({"to_user_id": 1, "amount": "1.00"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SAME_WALLET");
    assert!(!path.exists());
}
