//! Storage ports.
//! The reconciliation engine and handlers depend on these traits only.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{LedgerEntry, Namespace, Order, Payer};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of a conditional write to `success`.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// The entry as stored after the write attempt.
    pub entry: LedgerEntry,
    /// True only for the caller whose write changed the row.
    pub transitioned: bool,
    /// Orders flipped to paid inside the same atomic unit.
    pub orders_paid: u64,
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Inserts a new entry together with its order set. A reference that
    /// already exists is a `Conflict`.
    async fn insert(&self, entry: &LedgerEntry) -> RepositoryResult<LedgerEntry>;

    async fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<LedgerEntry>>;

    /// Entry `id` in `namespace`, only if one of its orders belongs to the customer.
    async fn find_for_customer(
        &self,
        namespace: Namespace,
        customer_id: Uuid,
        id: Uuid,
    ) -> RepositoryResult<Option<LedgerEntry>>;

    async fn list_for_customer(
        &self,
        namespace: Namespace,
        customer_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<LedgerEntry>>;

    /// Writes `failed` if the transition table allows it from the current
    /// status, otherwise leaves the entry untouched. Returns the stored entry.
    async fn mark_failed(&self, reference: &str) -> RepositoryResult<LedgerEntry>;

    /// Compare-and-swap to `success`. The winner pays every order of the entry
    /// in the same atomic unit; losers observe `transitioned == false`.
    async fn settle(&self, reference: &str) -> RepositoryResult<Settlement>;

    /// Pays any order still unpaid on an entry that is already `success`,
    /// under a lock on the entry. Returns the number of orders repaired.
    async fn settle_outstanding_orders(&self, reference: &str) -> RepositoryResult<u64>;

    async fn ping(&self) -> RepositoryResult<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_order(&self, order: &Order) -> RepositoryResult<Order>;

    async fn get_order(&self, id: Uuid) -> RepositoryResult<Option<Order>>;

    async fn unpaid_orders(
        &self,
        namespace: Namespace,
        customer_id: Uuid,
    ) -> RepositoryResult<Vec<Order>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Resolves a bearer token to its customer. Expired or unknown tokens
    /// resolve to `None`.
    async fn resolve_session(&self, token: &str) -> RepositoryResult<Option<Payer>>;
}
