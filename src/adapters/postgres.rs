//! Postgres implementation of the storage ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::domain::{LedgerEntry, LedgerStatus, Namespace, Order, Payer};
use crate::ports::{
    LedgerRepository, OrderRepository, RepositoryError, RepositoryResult, SessionRepository,
    Settlement,
};

const LEDGER_COLUMNS: &str = r#"
    pt.id, pt.reference, pt.namespace, pt.amount, pt.email, pt.status, pt.metadata,
    pt.created_at, pt.updated_at,
    ARRAY(
        SELECT pto.order_id FROM payment_transaction_orders pto
        WHERE pto.transaction_id = pt.id
        ORDER BY pto.order_id
    ) AS order_ids
"#;

/// Postgres-backed ledger, order and session store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_guard(target: LedgerStatus) -> Vec<String> {
    LedgerStatus::sources_of(target)
        .into_iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

async fn fetch_by_reference<'e, E: PgExecutor<'e>>(
    executor: E,
    reference: &str,
) -> RepositoryResult<Option<LedgerEntry>> {
    let sql = format!("SELECT {LEDGER_COLUMNS} FROM payment_transactions pt WHERE pt.reference = $1");
    let row = sqlx::query_as::<_, LedgerRow>(&sql)
        .bind(reference)
        .fetch_optional(executor)
        .await?;

    row.map(LedgerEntry::try_from).transpose()
}

/// Flips every unpaid order of the charge in one statement.
async fn pay_orders(conn: &mut PgConnection, transaction_id: Uuid) -> RepositoryResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET paid = TRUE, updated_at = NOW()
        WHERE paid = FALSE
        AND id IN (
            SELECT order_id FROM payment_transaction_orders WHERE transaction_id = $1
        )
        "#,
    )
    .bind(transaction_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl LedgerRepository for PostgresStore {
    async fn insert(&self, entry: &LedgerEntry) -> RepositoryResult<LedgerEntry> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, reference, namespace, amount, email, status, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.reference)
        .bind(entry.namespace.as_str())
        .bind(&entry.amount)
        .bind(&entry.email)
        .bind(entry.status.as_str())
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payment_transaction_orders (transaction_id, order_id)
            SELECT $1, order_id FROM UNNEST($2::uuid[]) AS order_id
            "#,
        )
        .bind(entry.id)
        .bind(&entry.order_ids)
        .execute(&mut *tx)
        .await?;

        let inserted = fetch_by_reference(&mut *tx, &entry.reference)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(entry.reference.clone()))?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<LedgerEntry>> {
        fetch_by_reference(&self.pool, reference).await
    }

    async fn find_for_customer(
        &self,
        namespace: Namespace,
        customer_id: Uuid,
        id: Uuid,
    ) -> RepositoryResult<Option<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {LEDGER_COLUMNS} FROM payment_transactions pt
            WHERE pt.id = $1 AND pt.namespace = $2
            AND EXISTS (
                SELECT 1 FROM payment_transaction_orders pto
                JOIN orders o ON o.id = pto.order_id
                WHERE pto.transaction_id = pt.id AND o.customer_id = $3
            )
            "#
        );
        let row = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(id)
            .bind(namespace.as_str())
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn list_for_customer(
        &self,
        namespace: Namespace,
        customer_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {LEDGER_COLUMNS} FROM payment_transactions pt
            WHERE pt.namespace = $1
            AND EXISTS (
                SELECT 1 FROM payment_transaction_orders pto
                JOIN orders o ON o.id = pto.order_id
                WHERE pto.transaction_id = pt.id AND o.customer_id = $2
            )
            ORDER BY pt.created_at DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(namespace.as_str())
            .bind(customer_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    async fn mark_failed(&self, reference: &str) -> RepositoryResult<LedgerEntry> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE payment_transactions SET status = $1, updated_at = NOW()
            WHERE reference = $2 AND status = ANY($3)
            "#,
        )
        .bind(LedgerStatus::Failed.as_str())
        .bind(reference)
        .bind(status_guard(LedgerStatus::Failed))
        .execute(&mut *tx)
        .await?;

        let entry = fetch_by_reference(&mut *tx, reference)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(reference.to_string()))?;

        tx.commit().await?;
        Ok(entry)
    }

    async fn settle(&self, reference: &str) -> RepositoryResult<Settlement> {
        let mut tx = self.pool.begin().await?;

        // A concurrent writer blocks on the row lock and then re-evaluates the
        // guard, so exactly one caller gets a row back.
        let won: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE payment_transactions SET status = $1, updated_at = NOW()
            WHERE reference = $2 AND status = ANY($3)
            RETURNING id
            "#,
        )
        .bind(LedgerStatus::Success.as_str())
        .bind(reference)
        .bind(status_guard(LedgerStatus::Success))
        .fetch_optional(&mut *tx)
        .await?;

        let orders_paid = match won {
            Some(id) => pay_orders(&mut tx, id).await?,
            None => 0,
        };

        let entry = fetch_by_reference(&mut *tx, reference)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(reference.to_string()))?;

        tx.commit().await?;

        Ok(Settlement {
            entry,
            transitioned: won.is_some(),
            orders_paid,
        })
    }

    async fn settle_outstanding_orders(&self, reference: &str) -> RepositoryResult<u64> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT id, status FROM payment_transactions WHERE reference = $1 FOR UPDATE",
        )
        .bind(reference)
        .fetch_optional(&mut *tx)
        .await?;

        let (id, status) = locked.ok_or_else(|| RepositoryError::NotFound(reference.to_string()))?;
        if status != LedgerStatus::Success.as_str() {
            tx.rollback().await?;
            return Ok(0);
        }

        let repaired = pay_orders(&mut tx, id).await?;
        tx.commit().await?;
        Ok(repaired)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert_order(&self, order: &Order) -> RepositoryResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO orders (id, namespace, customer_id, total, paid, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, namespace, customer_id, total, paid, created_at, updated_at
            "#,
        )
        .bind(order.id)
        .bind(order.namespace.as_str())
        .bind(order.customer_id)
        .bind(&order.total)
        .bind(order.paid)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Order::try_from(row)
    }

    async fn get_order(&self, id: Uuid) -> RepositoryResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, namespace, customer_id, total, paid, created_at, updated_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn unpaid_orders(
        &self,
        namespace: Namespace,
        customer_id: Uuid,
    ) -> RepositoryResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, namespace, customer_id, total, paid, created_at, updated_at
            FROM orders
            WHERE namespace = $1 AND customer_id = $2 AND paid = FALSE
            ORDER BY created_at ASC
            "#,
        )
        .bind(namespace.as_str())
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}

#[async_trait]
impl SessionRepository for PostgresStore {
    async fn resolve_session(&self, token: &str) -> RepositoryResult<Option<Payer>> {
        let row: Option<(Uuid, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT customer_id, email, name FROM customer_sessions
            WHERE token = $1 AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(customer_id, email, name)| Payer {
            customer_id,
            email,
            name,
        }))
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    reference: String,
    namespace: String,
    amount: BigDecimal,
    email: String,
    status: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    order_ids: Vec<Uuid>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = RepositoryError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            id: row.id,
            reference: row.reference,
            namespace: row.namespace.parse().map_err(RepositoryError::Database)?,
            amount: row.amount,
            email: row.email,
            status: row.status.parse().map_err(RepositoryError::Database)?,
            order_ids: row.order_ids,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    namespace: String,
    customer_id: Uuid,
    total: BigDecimal,
    paid: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            namespace: row.namespace.parse().map_err(RepositoryError::Database)?,
            customer_id: row.customer_id,
            total: row.total,
            paid: row.paid,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
