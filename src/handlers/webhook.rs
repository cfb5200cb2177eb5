use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use futures::FutureExt;
use serde::Deserialize;

use crate::domain::ReportedStatus;
use crate::error::AppError;
use crate::gateway::SIGNATURE_HEADER;
use crate::services::{ReconcileError, WebhookHandler, WebhookRouter, CHARGE_SUCCESS_EVENT};
use crate::subsystem::PaymentSubsystem;
use crate::utils::sanitize::sanitize_body;

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    pub reference: Option<String>,
    /// Minor units.
    pub amount: Option<i64>,
}

/// A subsystem's own webhook endpoint, reached through the shared router.
pub struct SubsystemWebhook {
    subsystem: Arc<PaymentSubsystem>,
}

impl SubsystemWebhook {
    pub fn new(subsystem: Arc<PaymentSubsystem>) -> Self {
        Self { subsystem }
    }

    async fn process(&self, headers: &HeaderMap, body: &Bytes) -> Result<StatusCode, AppError> {
        let namespace = self.subsystem.namespace;
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

        if !self.subsystem.verifier.verify(body, signature) {
            tracing::warn!(
                namespace = %namespace,
                signature_present = signature.is_some(),
                payload = %sanitize_body(body),
                "Rejected webhook with invalid signature"
            );
            return Err(AppError::SignatureInvalid);
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::PayloadMalformed(e.to_string()))?;

        if event.event != CHARGE_SUCCESS_EVENT {
            tracing::info!(namespace = %namespace, event = %event.event, "Ignoring webhook event");
            return Ok(StatusCode::OK);
        }

        let reference = event
            .data
            .reference
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| AppError::PayloadMalformed("missing data.reference".to_string()))?;

        let outcome = self
            .subsystem
            .engine
            .reconcile(reference, ReportedStatus::Success)
            .await
            .map_err(|e| {
                if let ReconcileError::ReferenceUnknown(_) = e {
                    tracing::warn!(reference = %reference, namespace = %namespace, "Webhook for unknown reference");
                }
                AppError::from(e)
            })?;

        self.subsystem
            .engine
            .audit_amount(&outcome.entry, event.data.amount);
        tracing::info!(
            reference = %reference,
            namespace = %namespace,
            settled = outcome.settled,
            "Webhook processed"
        );
        Ok(StatusCode::OK)
    }
}

#[async_trait]
impl WebhookHandler for SubsystemWebhook {
    async fn handle(&self, headers: &HeaderMap, body: &Bytes) -> StatusCode {
        match self.process(headers, body).await {
            Ok(status) => status,
            Err(e) => e.status_only(),
        }
    }
}

/// Fallback when no default subsystem is mounted: nothing owns the reference.
struct Unrouted;

#[async_trait]
impl WebhookHandler for Unrouted {
    async fn handle(&self, _headers: &HeaderMap, _body: &Bytes) -> StatusCode {
        StatusCode::NOT_FOUND
    }
}

/// Shared router over every subsystem, keyed by reference prefix. The default
/// subsystem takes everything unmarked.
pub fn webhook_router(subsystems: &[Arc<PaymentSubsystem>]) -> WebhookRouter {
    let fallback: Arc<dyn WebhookHandler> = match subsystems.iter().find(|s| s.namespace.is_default()) {
        Some(default) => Arc::new(SubsystemWebhook::new(default.clone())),
        None => Arc::new(Unrouted),
    };

    subsystems
        .iter()
        .filter(|s| !s.namespace.is_default())
        .fold(WebhookRouter::new(fallback), |router, s| {
            router.register(s.namespace.prefix(), Arc::new(SubsystemWebhook::new(s.clone())))
        })
}

/// `POST /payment/webhook/`. Errors are a bare status code; a panic anywhere
/// below becomes a 500.
pub async fn receive(
    State(router): State<Arc<WebhookRouter>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    match AssertUnwindSafe(router.route(&headers, &body))
        .catch_unwind()
        .await
    {
        Ok(status) => status,
        Err(_) => {
            tracing::error!("Webhook processing panicked");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
