#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use bigdecimal::BigDecimal;
use paystack_reconciler::{
    adapters::{InMemoryStore, Stores},
    config::GatewayConfig,
    create_app,
    domain::{LedgerEntry, Namespace, Order, Payer},
    gateway::{signature::sign, PaymentGateway, PaystackClient, SIGNATURE_HEADER},
    ports::{LedgerRepository, OrderRepository},
    services::{ReceiptDispatcher, SettlementReceipt},
    AppState,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const SECRET: &str = "sk_test_reconciler";
pub const CALLBACK_URL: &str = "https://shop.example.com/payment/callback";
/// Nothing listens here; tests that must not reach the gateway use it.
pub const UNREACHABLE_GATEWAY: &str = "http://127.0.0.1:9";

#[derive(Default)]
pub struct RecordingDispatcher {
    receipts: Mutex<Vec<SettlementReceipt>>,
}

impl RecordingDispatcher {
    pub fn references(&self) -> Vec<String> {
        self.receipts
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.reference.clone())
            .collect()
    }
}

impl ReceiptDispatcher for RecordingDispatcher {
    fn dispatch(&self, receipt: SettlementReceipt) {
        self.receipts.lock().unwrap().push(receipt);
    }
}

pub struct TestApp {
    pub store: InMemoryStore,
    pub receipts: Arc<RecordingDispatcher>,
    pub state: AppState,
}

impl TestApp {
    pub fn new(gateway_url: &str) -> Self {
        let config = gateway_config(gateway_url);
        let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackClient::new(&config).unwrap());
        Self::with_gateway(gateway, &config)
    }

    pub fn with_gateway(gateway: Arc<dyn PaymentGateway>, config: &GatewayConfig) -> Self {
        let store = InMemoryStore::new();
        let receipts = Arc::new(RecordingDispatcher::default());
        let state = AppState::new(
            Stores::in_memory(store.clone()),
            gateway,
            receipts.clone(),
            config,
        );
        Self {
            store,
            receipts,
            state,
        }
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<axum::body::BoxBody> {
        self.router().oneshot(request).await.unwrap()
    }

    /// A logged-in customer with a session token.
    pub async fn customer(&self, token: &str) -> Payer {
        let payer = Payer {
            customer_id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            name: Some("Ada Obi".to_string()),
        };
        self.store.insert_session(token, payer.clone()).await;
        payer
    }

    pub async fn unpaid_order(&self, namespace: Namespace, customer_id: Uuid, total: &str) -> Order {
        let order = Order::new(namespace, customer_id, BigDecimal::from_str(total).unwrap());
        self.store.insert_order(&order).await.unwrap()
    }

    /// A pending ledger entry over fresh orders, as checkout would leave it.
    pub async fn pending_charge(&self, namespace: Namespace, totals: &[&str]) -> LedgerEntry {
        let customer_id = Uuid::new_v4();
        let mut order_ids = Vec::new();
        let mut amount = BigDecimal::from(0);
        for total in totals {
            let order = self.unpaid_order(namespace, customer_id, total).await;
            amount = amount + order.total.clone();
            order_ids.push(order.id);
        }

        let entry = LedgerEntry::new(
            namespace,
            namespace.new_reference(),
            amount,
            "a@b.com".to_string(),
            order_ids,
            serde_json::json!({}),
        );
        self.store.insert(&entry).await.unwrap()
    }

    pub async fn entry(&self, reference: &str) -> LedgerEntry {
        self.store.find_by_reference(reference).await.unwrap().unwrap()
    }

    pub async fn all_orders_paid(&self, entry: &LedgerEntry) -> bool {
        for id in &entry.order_ids {
            let order = self.store.get_order(*id).await.unwrap().unwrap();
            if !order.paid {
                return false;
            }
        }
        true
    }
}

pub fn gateway_config(base_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::new(base_url, SECRET, CALLBACK_URL);
    config.timeout = std::time::Duration::from_secs(2);
    config
}

pub fn charge_success_body(reference: &str, amount_minor: i64) -> String {
    serde_json::json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": amount_minor,
            "status": "success",
            "authorization": { "last4": "4081", "bin": "408408" }
        }
    })
    .to_string()
}

pub fn signed_webhook(path: &str, body: &str) -> Request<Body> {
    webhook_with_signature(path, body, Some(&sign(body.as_bytes(), SECRET.as_bytes())))
}

pub fn webhook_with_signature(path: &str, body: &str, signature: Option<&str>) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header(SIGNATURE_HEADER, signature);
    }
    request.body(Body::from(body.to_string())).unwrap()
}

pub fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response<axum::body::BoxBody>) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
