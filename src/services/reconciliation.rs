use std::sync::Arc;

use thiserror::Error;

use crate::domain::{LedgerEntry, LedgerStatus, Namespace, ReportedStatus};
use crate::gateway::to_minor_units;
use crate::ports::{LedgerRepository, RepositoryError};
use crate::services::receipts::{ReceiptDispatcher, SettlementReceipt};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Unknown payment reference: {0}")]
    ReferenceUnknown(String),

    #[error(transparent)]
    Storage(RepositoryError),
}

impl From<RepositoryError> for ReconcileError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(reference) => ReconcileError::ReferenceUnknown(reference),
            other => ReconcileError::Storage(other),
        }
    }
}

/// Outcome of one reconcile call.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub entry: LedgerEntry,
    /// True only for the call that moved the entry to `success`.
    pub settled: bool,
}

impl Reconciliation {
    pub fn status(&self) -> LedgerStatus {
        self.entry.status
    }
}

/// Applies gateway-reported outcomes to the ledger of one subsystem. The
/// webhook handler and the poll endpoint both go through `reconcile`.
#[derive(Clone)]
pub struct ReconciliationEngine {
    namespace: Namespace,
    ledger: Arc<dyn LedgerRepository>,
    dispatcher: Arc<dyn ReceiptDispatcher>,
}

impl ReconciliationEngine {
    pub fn new(
        namespace: Namespace,
        ledger: Arc<dyn LedgerRepository>,
        dispatcher: Arc<dyn ReceiptDispatcher>,
    ) -> Self {
        Self {
            namespace,
            ledger,
            dispatcher,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Entry for `reference` if it belongs to this engine's subsystem.
    pub async fn lookup(&self, reference: &str) -> Result<LedgerEntry, ReconcileError> {
        match self.ledger.find_by_reference(reference).await? {
            Some(entry) if entry.namespace == self.namespace => Ok(entry),
            _ => Err(ReconcileError::ReferenceUnknown(reference.to_string())),
        }
    }

    pub async fn reconcile(
        &self,
        reference: &str,
        reported: ReportedStatus,
    ) -> Result<Reconciliation, ReconcileError> {
        let entry = self.lookup(reference).await?;

        if entry.is_paid() {
            return self.already_settled(entry).await;
        }

        if !reported.is_success() {
            let entry = self.ledger.mark_failed(reference).await?;
            tracing::info!(
                reference = %reference,
                namespace = %self.namespace,
                reported = ?reported,
                status = %entry.status,
                "Charge not successful"
            );
            return Ok(Reconciliation {
                entry,
                settled: false,
            });
        }

        let settlement = self.ledger.settle(reference).await?;
        if !settlement.transitioned {
            // Another caller won the write between lookup and settle.
            tracing::debug!(reference = %reference, "Settlement already applied");
            return self.already_settled(settlement.entry).await;
        }

        tracing::info!(
            reference = %reference,
            namespace = %self.namespace,
            orders_paid = settlement.orders_paid,
            "Payment settled"
        );
        self.dispatcher
            .dispatch(SettlementReceipt::from(&settlement.entry));

        Ok(Reconciliation {
            entry: settlement.entry,
            settled: true,
        })
    }

    /// Logs a warning when the gateway charged a different amount than the
    /// ledger expects. Never rejects.
    pub fn audit_amount(&self, entry: &LedgerEntry, reported_minor_units: Option<i64>) {
        let Some(reported) = reported_minor_units else {
            return;
        };

        let expected = to_minor_units(&entry.amount);
        if expected != Some(reported) {
            tracing::warn!(
                reference = %entry.reference,
                expected_minor_units = ?expected,
                reported_minor_units = reported,
                "Gateway amount does not match ledger amount"
            );
        }
    }

    async fn already_settled(&self, entry: LedgerEntry) -> Result<Reconciliation, ReconcileError> {
        let repaired = self.ledger.settle_outstanding_orders(&entry.reference).await?;
        if repaired > 0 {
            tracing::warn!(
                reference = %entry.reference,
                orders = repaired,
                "Paid orders left unsettled by an earlier success"
            );
        }

        Ok(Reconciliation {
            entry,
            settled: false,
        })
    }
}
