use std::sync::Arc;

use crate::adapters::Stores;
use crate::config::GatewayConfig;
use crate::domain::{Namespace, ReportedStatus};
use crate::error::AppError;
use crate::gateway::{PaymentGateway, SignatureVerifier};
use crate::ports::LedgerRepository;
use crate::services::{CheckoutService, ReceiptDispatcher, Reconciliation, ReconciliationEngine};
use crate::utils::sanitize::sanitize_json;

/// Everything one order subsystem needs to take and settle payments. All
/// subsystems share the gateway account, the ledger and the receipt queue.
pub struct PaymentSubsystem {
    pub namespace: Namespace,
    pub engine: ReconciliationEngine,
    pub checkout: CheckoutService,
    pub gateway: Arc<dyn PaymentGateway>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub verifier: SignatureVerifier,
}

impl PaymentSubsystem {
    pub fn new(
        namespace: Namespace,
        stores: &Stores,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<dyn ReceiptDispatcher>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            namespace,
            engine: ReconciliationEngine::new(namespace, stores.ledger.clone(), dispatcher),
            checkout: CheckoutService::new(
                namespace,
                stores.orders.clone(),
                stores.ledger.clone(),
                gateway.clone(),
                config.callback_url.clone(),
            ),
            gateway,
            ledger: stores.ledger.clone(),
            verifier: SignatureVerifier::new(config),
        }
    }

    /// Poll path. Settled entries are answered from the ledger; anything else
    /// is confirmed with the gateway first, and the ledger is only written
    /// after the gateway answered.
    pub async fn poll(&self, reference: &str) -> Result<Reconciliation, AppError> {
        let entry = self.engine.lookup(reference).await?;

        if entry.is_paid() {
            return Ok(self.engine.reconcile(reference, ReportedStatus::Success).await?);
        }

        let charge = self.gateway.query_charge(reference).await?;
        tracing::debug!(
            reference = %reference,
            reported = ?charge.reported,
            payload = %sanitize_json(&charge.raw),
            "Gateway status received"
        );

        let outcome = self.engine.reconcile(reference, charge.reported).await?;
        self.engine.audit_amount(&outcome.entry, charge.amount_minor);
        Ok(outcome)
    }
}

pub fn build_subsystems(
    stores: &Stores,
    gateway: Arc<dyn PaymentGateway>,
    dispatcher: Arc<dyn ReceiptDispatcher>,
    config: &GatewayConfig,
) -> Vec<Arc<PaymentSubsystem>> {
    Namespace::ALL
        .into_iter()
        .map(|namespace| {
            Arc::new(PaymentSubsystem::new(
                namespace,
                stores,
                gateway.clone(),
                dispatcher.clone(),
                config,
            ))
        })
        .collect()
}
