use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{LedgerEntry, Namespace};

/// What the receipt collaborator needs to know about a fresh settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub reference: String,
    pub namespace: Namespace,
    pub email: String,
    pub amount: BigDecimal,
    pub order_ids: Vec<Uuid>,
    pub settled_at: DateTime<Utc>,
}

impl From<&LedgerEntry> for SettlementReceipt {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            reference: entry.reference.clone(),
            namespace: entry.namespace,
            email: entry.email.clone(),
            amount: entry.amount.clone(),
            order_ids: entry.order_ids.clone(),
            settled_at: entry.updated_at,
        }
    }
}

/// Hands a settled entry off to receipt generation. Never fails from the
/// caller's point of view.
pub trait ReceiptDispatcher: Send + Sync {
    fn dispatch(&self, receipt: SettlementReceipt);
}

/// Enqueues receipts for the background worker.
#[derive(Clone)]
pub struct QueuedReceiptDispatcher {
    sender: mpsc::UnboundedSender<SettlementReceipt>,
}

impl QueuedReceiptDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SettlementReceipt>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ReceiptDispatcher for QueuedReceiptDispatcher {
    fn dispatch(&self, receipt: SettlementReceipt) {
        if let Err(e) = self.sender.send(receipt) {
            error!(
                reference = %e.0.reference,
                "Receipt queue is closed; receipt needs manual follow-up"
            );
        }
    }
}

#[async_trait]
pub trait ReceiptNotifier: Send + Sync {
    async fn notify(&self, receipt: &SettlementReceipt) -> anyhow::Result<()>;
}

/// Default notifier when no receipt service is configured.
pub struct LogReceiptNotifier;

#[async_trait]
impl ReceiptNotifier for LogReceiptNotifier {
    async fn notify(&self, receipt: &SettlementReceipt) -> anyhow::Result<()> {
        info!(
            reference = %receipt.reference,
            namespace = %receipt.namespace,
            amount = %receipt.amount,
            orders = receipt.order_ids.len(),
            "Receipt ready for delivery"
        );
        Ok(())
    }
}

/// Posts each receipt as JSON to the receipt service.
pub struct HttpReceiptNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpReceiptNotifier {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, url }
    }
}

#[async_trait]
impl ReceiptNotifier for HttpReceiptNotifier {
    async fn notify(&self, receipt: &SettlementReceipt) -> anyhow::Result<()> {
        let response = self.client.post(&self.url).json(receipt).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("receipt service returned HTTP {}", response.status());
        }
        Ok(())
    }
}

/// Drains the receipt queue until every dispatcher is dropped. Delivery
/// failures and notifier panics are logged and never retried here; the
/// worker keeps draining either way.
pub async fn run_receipt_worker(
    mut receiver: mpsc::UnboundedReceiver<SettlementReceipt>,
    notifier: Arc<dyn ReceiptNotifier>,
) {
    info!("Receipt worker started");

    while let Some(receipt) = receiver.recv().await {
        let delivery = AssertUnwindSafe(notifier.notify(&receipt))
            .catch_unwind()
            .await;

        match delivery {
            Ok(Ok(())) => info!(reference = %receipt.reference, "Receipt dispatched"),
            Ok(Err(e)) => error!(
                reference = %receipt.reference,
                error = %e,
                "Receipt delivery failed; manual follow-up required"
            ),
            Err(_) => error!(
                reference = %receipt.reference,
                "Receipt notifier panicked; manual follow-up required"
            ),
        }
    }

    info!("Receipt worker stopped");
}
