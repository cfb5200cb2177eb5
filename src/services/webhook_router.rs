use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::error::AppError;

/// The only event that settles a charge.
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

/// Receives a webhook exactly as the gateway sent it.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, headers: &HeaderMap, body: &Bytes) -> StatusCode;
}

/// Dispatches a shared webhook endpoint to the subsystem owning the reference.
///
/// The router only reads the body to find `data.reference`. Headers and raw
/// bytes go to the chosen handler untouched, and signature checks stay there.
pub struct WebhookRouter {
    /// Longest prefix first, so overlapping markers resolve to the most specific.
    routes: Vec<(String, Arc<dyn WebhookHandler>)>,
    fallback: Arc<dyn WebhookHandler>,
}

impl WebhookRouter {
    pub fn new(fallback: Arc<dyn WebhookHandler>) -> Self {
        Self {
            routes: Vec::new(),
            fallback,
        }
    }

    pub fn register(mut self, prefix: impl Into<String>, handler: Arc<dyn WebhookHandler>) -> Self {
        self.routes.push((prefix.into(), handler));
        self.routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn handler_for(&self, reference: &str) -> &Arc<dyn WebhookHandler> {
        self.routes
            .iter()
            .find(|(prefix, _)| reference.starts_with(prefix.as_str()))
            .map(|(_, handler)| handler)
            .unwrap_or(&self.fallback)
    }

    pub async fn route(&self, headers: &HeaderMap, body: &Bytes) -> StatusCode {
        match self.handler_for_body(body) {
            Ok(handler) => handler.handle(headers, body).await,
            Err(e) => e.status_only(),
        }
    }

    /// Charge events are routed by reference and must carry one. Other events
    /// without a reference go to the fallback, which acknowledges them after
    /// checking the signature.
    fn handler_for_body(&self, body: &Bytes) -> Result<&Arc<dyn WebhookHandler>, AppError> {
        let payload: Value = serde_json::from_slice(body).map_err(|e| {
            tracing::warn!(error = %e, "Webhook body is not valid JSON");
            AppError::PayloadMalformed(e.to_string())
        })?;

        match extract_reference(&payload) {
            Some(reference) => {
                tracing::debug!(reference = %reference, "Routing webhook");
                Ok(self.handler_for(reference))
            }
            None if extract_event(&payload) == Some(CHARGE_SUCCESS_EVENT) => {
                tracing::warn!("Charge webhook has no data.reference");
                Err(AppError::PayloadMalformed("missing data.reference".to_string()))
            }
            None => Ok(&self.fallback),
        }
    }
}

fn extract_event(payload: &Value) -> Option<&str> {
    payload.get("event")?.as_str()
}

pub fn extract_reference(payload: &Value) -> Option<&str> {
    payload
        .get("data")?
        .get("reference")?
        .as_str()
        .filter(|r| !r.trim().is_empty())
}
