use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::namespace::Namespace;

/// An order owned by one of the order subsystems. Only its `paid` flag is ever
/// written by settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub namespace: Namespace,
    pub customer_id: Uuid,
    pub total: BigDecimal,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(namespace: Namespace, customer_id: Uuid, total: BigDecimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            namespace,
            customer_id,
            total,
            paid: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The authenticated customer behind a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payer {
    pub customer_id: Uuid,
    pub email: String,
    pub name: Option<String>,
}
