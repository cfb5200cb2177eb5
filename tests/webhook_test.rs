mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use common::*;
use paystack_reconciler::{
    adapters::{InMemoryStore, Stores},
    create_app,
    domain::{LedgerEntry, LedgerStatus, Namespace},
    gateway::{signature::sign, PaymentGateway, PaystackClient},
    ports::{LedgerRepository, RepositoryResult, Settlement},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

const WEBHOOK: &str = "/payment/webhook/";

#[tokio::test]
async fn test_forged_signature_is_rejected_without_mutation() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);
    let entry = app.pending_charge(Namespace::Generic, &["5000.00"]).await;
    let body = charge_success_body(&entry.reference, 500_000);

    let forged = sign(body.as_bytes(), b"someone_elses_key");
    let response = app
        .send(webhook_with_signature(WEBHOOK, &body, Some(&forged)))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(webhook_with_signature(WEBHOOK, &body, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(app.entry(&entry.reference).await.status, LedgerStatus::Pending);
    assert!(!app.all_orders_paid(&entry).await);
    assert!(app.receipts.references().is_empty());
}

#[tokio::test]
async fn test_signature_over_reserialized_body_is_rejected() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);
    let entry = app.pending_charge(Namespace::Generic, &["100.00"]).await;
    let body = charge_success_body(&entry.reference, 10_000);

    let pretty = serde_json::to_string_pretty(&serde_json::from_str::<serde_json::Value>(&body).unwrap())
        .unwrap();
    let signature = sign(pretty.as_bytes(), SECRET.as_bytes());

    let response = app
        .send(webhook_with_signature(WEBHOOK, &body, Some(&signature)))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_settlement_scenario_with_replay() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);
    let entry = app
        .pending_charge(Namespace::Generic, &["3000.00", "2000.00"])
        .await;
    let body = charge_success_body(&entry.reference, 500_000);

    let response = app.send(signed_webhook(WEBHOOK, &body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let settled = app.entry(&entry.reference).await;
    assert_eq!(settled.status, LedgerStatus::Success);
    assert!(app.all_orders_paid(&entry).await);
    assert_eq!(app.receipts.references(), vec![entry.reference.clone()]);

    let updated_at = settled.updated_at;
    for _ in 0..3 {
        let response = app.send(signed_webhook(WEBHOOK, &body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(app.entry(&entry.reference).await.updated_at, updated_at);
    assert_eq!(app.receipts.references().len(), 1);
}

#[tokio::test]
async fn test_path_without_trailing_slash() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);
    let entry = app.pending_charge(Namespace::Generic, &["100.00"]).await;
    let body = charge_success_body(&entry.reference, 10_000);

    let response = app.send(signed_webhook("/payment/webhook", &body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.entry(&entry.reference).await.status, LedgerStatus::Success);
}

#[tokio::test]
async fn test_other_events_are_acknowledged_without_action() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);
    let entry = app.pending_charge(Namespace::Generic, &["100.00"]).await;

    for event in ["charge.failed", "transfer.success", "subscription.create"] {
        let body = serde_json::json!({
            "event": event,
            "data": { "reference": entry.reference, "status": "failed" }
        })
        .to_string();

        let response = app.send(signed_webhook(WEBHOOK, &body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(app.entry(&entry.reference).await.status, LedgerStatus::Pending);
}

#[tokio::test]
async fn test_failed_entry_is_settled_by_later_webhook() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);
    let entry = app.pending_charge(Namespace::Generic, &["100.00"]).await;
    app.store.mark_failed(&entry.reference).await.unwrap();

    let body = charge_success_body(&entry.reference, 10_000);
    let response = app.send(signed_webhook(WEBHOOK, &body)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.entry(&entry.reference).await.status, LedgerStatus::Success);
    assert!(app.all_orders_paid(&entry).await);
    assert_eq!(app.receipts.references().len(), 1);
}

#[tokio::test]
async fn test_unknown_reference_is_not_found() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);
    let body = charge_success_body("PAY-NOSUCHREFERENCE", 10_000);

    let response = app.send(signed_webhook(WEBHOOK, &body)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_payloads_are_bad_requests() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);

    for body in [
        "this is not json",
        r#"{"event":"charge.success"}"#,
        r#"{"event":"charge.success","data":{"amount":100}}"#,
        r#"{"event":"charge.success","data":{"reference":""}}"#,
    ] {
        let response = app.send(signed_webhook(WEBHOOK, body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
    }
}

#[tokio::test]
async fn test_other_events_without_reference_are_acknowledged() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);

    for body in [
        r#"{"event":"transfer.success","data":{}}"#,
        r#"{"event":"subscription.create","data":{"amount":100}}"#,
        r#"{"event":"paymentrequest.pending"}"#,
    ] {
        let response = app.send(signed_webhook(WEBHOOK, body)).await;
        assert_eq!(response.status(), StatusCode::OK, "body: {}", body);
    }

    // Acknowledged only once the signature checks out.
    let body = r#"{"event":"transfer.success","data":{}}"#;
    let response = app
        .send(webhook_with_signature(WEBHOOK, body, Some("deadbeef")))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_prefixed_references_reach_their_subsystem() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);
    let bulk = app.pending_charge(Namespace::Bulk, &["1200.00"]).await;
    let clothing = app.pending_charge(Namespace::Clothing, &["80.50"]).await;

    for entry in [&bulk, &clothing] {
        assert_ne!(entry.namespace, Namespace::Generic);
        let body = charge_success_body(&entry.reference, 0);
        let response = app.send(signed_webhook(WEBHOOK, &body)).await;

        // Only the owning subsystem knows the entry; any other would answer 404.
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.entry(&entry.reference).await.status, LedgerStatus::Success);
    }

    assert_eq!(app.receipts.references().len(), 2);
}

#[tokio::test]
async fn test_amount_mismatch_still_settles() {
    let app = TestApp::new(UNREACHABLE_GATEWAY);
    let entry = app.pending_charge(Namespace::Generic, &["5000.00"]).await;
    let body = charge_success_body(&entry.reference, 100);

    let response = app.send(signed_webhook(WEBHOOK, &body)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.entry(&entry.reference).await.status, LedgerStatus::Success);
}

/// Ledger whose every call panics.
struct ExplodingLedger;

#[async_trait]
impl LedgerRepository for ExplodingLedger {
    async fn insert(&self, _entry: &LedgerEntry) -> RepositoryResult<LedgerEntry> {
        panic!("boom")
    }
    async fn find_by_reference(&self, _reference: &str) -> RepositoryResult<Option<LedgerEntry>> {
        panic!("boom")
    }
    async fn find_for_customer(
        &self,
        _namespace: Namespace,
        _customer_id: Uuid,
        _id: Uuid,
    ) -> RepositoryResult<Option<LedgerEntry>> {
        panic!("boom")
    }
    async fn list_for_customer(
        &self,
        _namespace: Namespace,
        _customer_id: Uuid,
        _limit: i64,
        _offset: i64,
    ) -> RepositoryResult<Vec<LedgerEntry>> {
        panic!("boom")
    }
    async fn mark_failed(&self, _reference: &str) -> RepositoryResult<LedgerEntry> {
        panic!("boom")
    }
    async fn settle(&self, _reference: &str) -> RepositoryResult<Settlement> {
        panic!("boom")
    }
    async fn settle_outstanding_orders(&self, _reference: &str) -> RepositoryResult<u64> {
        panic!("boom")
    }
    async fn ping(&self) -> RepositoryResult<()> {
        panic!("boom")
    }
}

#[tokio::test]
async fn test_panic_during_processing_is_internal_error() {
    let store = InMemoryStore::new();
    let mut stores = Stores::in_memory(store);
    stores.ledger = Arc::new(ExplodingLedger);

    let config = gateway_config(UNREACHABLE_GATEWAY);
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackClient::new(&config).unwrap());
    let state = AppState::new(stores, gateway, Arc::new(RecordingDispatcher::default()), &config);

    let body = charge_success_body("PAY-ANY", 100);
    let response = create_app(state)
        .oneshot(signed_webhook(WEBHOOK, &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
