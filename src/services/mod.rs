pub mod checkout;
pub mod receipts;
pub mod reconciliation;
pub mod webhook_router;

pub use checkout::{CheckoutError, CheckoutService, CheckoutSession};
pub use receipts::{
    run_receipt_worker, HttpReceiptNotifier, LogReceiptNotifier, QueuedReceiptDispatcher,
    ReceiptDispatcher, ReceiptNotifier, SettlementReceipt,
};
pub use reconciliation::{ReconcileError, Reconciliation, ReconciliationEngine};
pub use webhook_router::{WebhookHandler, WebhookRouter, CHARGE_SUCCESS_EVENT};
