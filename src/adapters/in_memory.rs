use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{LedgerEntry, LedgerStatus, Namespace, Order, Payer};
use crate::ports::{
    LedgerRepository, OrderRepository, RepositoryError, RepositoryResult, SessionRepository,
    Settlement,
};

#[derive(Default)]
struct State {
    entries: HashMap<String, LedgerEntry>,
    orders: HashMap<Uuid, Order>,
    sessions: HashMap<String, Payer>,
}

impl State {
    fn owned_by(&self, entry: &LedgerEntry, customer_id: Uuid) -> bool {
        entry
            .order_ids
            .iter()
            .filter_map(|id| self.orders.get(id))
            .any(|order| order.customer_id == customer_id)
    }

    fn pay_orders(&mut self, order_ids: &[Uuid]) -> u64 {
        let mut paid = 0;
        for id in order_ids {
            if let Some(order) = self.orders.get_mut(id) {
                if !order.paid {
                    order.paid = true;
                    order.updated_at = Utc::now();
                    paid += 1;
                }
            }
        }
        paid
    }
}

/// A thread-safe in-memory store implementing every storage port.
///
/// All state sits behind one `RwLock`, so a write holds the equivalent of a
/// row lock across the status check and the order fan-out.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_session(&self, token: &str, payer: Payer) {
        let mut state = self.state.write().await;
        state.sessions.insert(token.to_string(), payer);
    }

    /// Overwrites the stored status without touching any order. Used to stage
    /// entries whose settlement was interrupted.
    pub async fn write_status_unchecked(&self, reference: &str, status: LedgerStatus) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get_mut(reference)
            .ok_or_else(|| RepositoryError::NotFound(reference.to_string()))?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn insert(&self, entry: &LedgerEntry) -> RepositoryResult<LedgerEntry> {
        let mut state = self.state.write().await;
        if state.entries.contains_key(&entry.reference) {
            return Err(RepositoryError::Conflict(format!(
                "reference {} already exists",
                entry.reference
            )));
        }
        if let Some(missing) = entry.order_ids.iter().find(|id| !state.orders.contains_key(*id)) {
            return Err(RepositoryError::Database(format!("order {} does not exist", missing)));
        }
        state.entries.insert(entry.reference.clone(), entry.clone());
        Ok(entry.clone())
    }

    async fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state.entries.get(reference).cloned())
    }

    async fn find_for_customer(
        &self,
        namespace: Namespace,
        customer_id: Uuid,
        id: Uuid,
    ) -> RepositoryResult<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .values()
            .find(|e| e.id == id && e.namespace == namespace && state.owned_by(e, customer_id))
            .cloned())
    }

    async fn list_for_customer(
        &self,
        namespace: Namespace,
        customer_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .values()
            .filter(|e| e.namespace == namespace && state.owned_by(e, customer_id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn mark_failed(&self, reference: &str) -> RepositoryResult<LedgerEntry> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get_mut(reference)
            .ok_or_else(|| RepositoryError::NotFound(reference.to_string()))?;

        if entry.status.can_transition_to(LedgerStatus::Failed) {
            entry.status = LedgerStatus::Failed;
            entry.updated_at = Utc::now();
        }
        Ok(entry.clone())
    }

    async fn settle(&self, reference: &str) -> RepositoryResult<Settlement> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get_mut(reference)
            .ok_or_else(|| RepositoryError::NotFound(reference.to_string()))?;

        if !entry.status.can_transition_to(LedgerStatus::Success) {
            return Ok(Settlement {
                entry: entry.clone(),
                transitioned: false,
                orders_paid: 0,
            });
        }

        entry.status = LedgerStatus::Success;
        entry.updated_at = Utc::now();
        let entry = entry.clone();
        let orders_paid = state.pay_orders(&entry.order_ids);

        Ok(Settlement {
            entry,
            transitioned: true,
            orders_paid,
        })
    }

    async fn settle_outstanding_orders(&self, reference: &str) -> RepositoryResult<u64> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get(reference)
            .ok_or_else(|| RepositoryError::NotFound(reference.to_string()))?;

        if entry.status != LedgerStatus::Success {
            return Ok(0);
        }
        let order_ids = entry.order_ids.clone();
        Ok(state.pay_orders(&order_ids))
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> RepositoryResult<Order> {
        let mut state = self.state.write().await;
        state.orders.insert(order.id, order.clone());
        Ok(order.clone())
    }

    async fn get_order(&self, id: Uuid) -> RepositoryResult<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id).cloned())
    }

    async fn unpaid_orders(
        &self,
        namespace: Namespace,
        customer_id: Uuid,
    ) -> RepositoryResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.namespace == namespace && o.customer_id == customer_id && !o.paid)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn resolve_session(&self, token: &str) -> RepositoryResult<Option<Payer>> {
        let state = self.state.read().await;
        Ok(state.sessions.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    async fn seeded_entry(store: &InMemoryStore, customer_id: Uuid) -> LedgerEntry {
        let order = Order::new(Namespace::Generic, customer_id, BigDecimal::from(2500));
        store.insert_order(&order).await.unwrap();
        let entry = LedgerEntry::new(
            Namespace::Generic,
            Namespace::Generic.new_reference(),
            BigDecimal::from(2500),
            "a@b.com".to_string(),
            vec![order.id],
            serde_json::json!({}),
        );
        store.insert(&entry).await.unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_reference_is_conflict() {
        let store = InMemoryStore::new();
        let entry = seeded_entry(&store, Uuid::new_v4()).await;

        let err = store.insert(&entry).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_settle_is_compare_and_swap() {
        let store = InMemoryStore::new();
        let entry = seeded_entry(&store, Uuid::new_v4()).await;

        let first = store.settle(&entry.reference).await.unwrap();
        assert!(first.transitioned);
        assert_eq!(first.orders_paid, 1);

        let second = store.settle(&entry.reference).await.unwrap();
        assert!(!second.transitioned);
        assert_eq!(second.orders_paid, 0);
        assert_eq!(second.entry.status, LedgerStatus::Success);
    }

    #[tokio::test]
    async fn test_mark_failed_never_leaves_success() {
        let store = InMemoryStore::new();
        let entry = seeded_entry(&store, Uuid::new_v4()).await;
        store.settle(&entry.reference).await.unwrap();

        let after = store.mark_failed(&entry.reference).await.unwrap();
        assert_eq!(after.status, LedgerStatus::Success);
    }

    #[tokio::test]
    async fn test_listing_is_scoped_to_customer() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let entry = seeded_entry(&store, owner).await;

        let mine = store
            .list_for_customer(Namespace::Generic, owner, 20, 0)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].reference, entry.reference);

        let theirs = store
            .list_for_customer(Namespace::Generic, Uuid::new_v4(), 20, 0)
            .await
            .unwrap();
        assert!(theirs.is_empty());

        let other_ns = store
            .find_for_customer(Namespace::Bulk, owner, entry.id)
            .await
            .unwrap();
        assert!(other_ns.is_none());
    }
}
