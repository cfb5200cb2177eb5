pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use sqlx::PgPool;

use crate::ports::{LedgerRepository, OrderRepository, SessionRepository};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// The storage ports wired to one backend.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn LedgerRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PostgresStore::new(pool));
        Self {
            ledger: store.clone(),
            orders: store.clone(),
            sessions: store,
        }
    }

    pub fn in_memory(store: InMemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            ledger: store.clone(),
            orders: store.clone(),
            sessions: store,
        }
    }
}
