//! Ledger entry domain entity.
//! Framework-agnostic record of one gateway charge and the orders it settles.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::namespace::Namespace;

/// Local status of a ledger entry.
///
/// `Success` is absorbing. `Failed` is not: the gateway stays authoritative and
/// a later confirmation may still settle the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Pending,
    Success,
    Failed,
}

/// Every status write permitted on a ledger entry, as `(from, to)`.
const TRANSITIONS: &[(LedgerStatus, LedgerStatus)] = &[
    (LedgerStatus::Pending, LedgerStatus::Success),
    (LedgerStatus::Pending, LedgerStatus::Failed),
    (LedgerStatus::Failed, LedgerStatus::Success),
];

impl LedgerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Success => "success",
            LedgerStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: LedgerStatus) -> bool {
        TRANSITIONS.contains(&(self, next))
    }

    /// Statuses from which `target` may be written. Storage adapters use this
    /// list as the guard of their conditional update.
    pub fn sources_of(target: LedgerStatus) -> Vec<LedgerStatus> {
        TRANSITIONS
            .iter()
            .filter(|(_, to)| *to == target)
            .map(|(from, _)| *from)
            .collect()
    }

    pub fn is_absorbing(self) -> bool {
        !TRANSITIONS.iter().any(|(from, _)| *from == self)
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LedgerStatus::Pending),
            "success" => Ok(LedgerStatus::Success),
            "failed" => Ok(LedgerStatus::Failed),
            other => Err(format!("unknown ledger status '{}'", other)),
        }
    }
}

/// Charge status as reported by the gateway, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedStatus {
    Success,
    Failed,
    Other,
}

impl ReportedStatus {
    pub fn from_gateway(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" => ReportedStatus::Success,
            "failed" => ReportedStatus::Failed,
            _ => ReportedStatus::Other,
        }
    }

    pub fn is_success(self) -> bool {
        self == ReportedStatus::Success
    }
}

/// Domain entity representing one charge attempt.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub reference: String,
    pub namespace: Namespace,
    pub amount: BigDecimal,
    pub email: String,
    pub status: LedgerStatus,
    /// Orders settled by this charge. Fixed at creation.
    pub order_ids: Vec<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        namespace: Namespace,
        reference: String,
        amount: BigDecimal,
        email: String,
        order_ids: Vec<Uuid>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference,
            namespace,
            amount,
            email,
            status: LedgerStatus::Pending,
            order_ids,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == LedgerStatus::Success
    }
}
