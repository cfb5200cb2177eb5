pub mod ledger;
pub mod namespace;
pub mod order;

pub use ledger::{LedgerEntry, LedgerStatus, ReportedStatus};
pub use namespace::Namespace;
pub use order::{Order, Payer};
