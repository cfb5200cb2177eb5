use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{LedgerEntry, LedgerStatus, Payer};
use crate::error::AppError;
use crate::middleware::auth::customer_auth;
use crate::ports::SessionRepository;
use crate::services::Reconciliation;
use crate::subsystem::PaymentSubsystem;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct VerifyQuery {
    pub reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub reference: String,
    pub status: LedgerStatus,
    pub amount: BigDecimal,
    pub paid: bool,
    pub message: String,
}

impl From<Reconciliation> for VerifyResponse {
    fn from(outcome: Reconciliation) -> Self {
        let paid = outcome.entry.is_paid();
        Self {
            message: if paid {
                "Payment successful".to_string()
            } else {
                "Payment not successful".to_string()
            },
            reference: outcome.entry.reference,
            status: outcome.entry.status,
            amount: outcome.entry.amount,
            paid,
        }
    }
}

/// Payment endpoints of one subsystem, mounted under its base path.
pub fn routes(subsystem: Arc<PaymentSubsystem>, sessions: Arc<dyn SessionRepository>) -> Router {
    let base = subsystem.namespace.base_path();

    let authenticated = Router::new()
        .route(&format!("{base}/initiate"), post(initiate))
        .route(&format!("{base}/transactions"), get(list_transactions))
        .route(&format!("{base}/transactions/:id"), get(get_transaction))
        .route_layer(middleware::from_fn_with_state(sessions, customer_auth));

    Router::new()
        .route(&format!("{base}/verify"), get(verify))
        .merge(authenticated)
        .with_state(subsystem)
}

pub async fn initiate(
    State(subsystem): State<Arc<PaymentSubsystem>>,
    Extension(payer): Extension<Payer>,
) -> Response {
    match subsystem.checkout.initiate(&payer).await {
        Ok(session) => Json(session).into_response(),
        Err(e) => AppError::from(e).into_payment_response(None),
    }
}

/// Client-initiated status check.
pub async fn verify(
    State(subsystem): State<Arc<PaymentSubsystem>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let Some(reference) = query.reference.filter(|r| !r.trim().is_empty()) else {
        return AppError::BadRequest("reference is required".to_string()).into_payment_response(None);
    };

    match subsystem.poll(&reference).await {
        Ok(outcome) => Json(VerifyResponse::from(outcome)).into_response(),
        Err(e) => e.into_payment_response(Some(&reference)),
    }
}

pub async fn list_transactions(
    State(subsystem): State<Arc<PaymentSubsystem>>,
    Extension(payer): Extension<Payer>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    let limit = pagination
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = pagination.offset.unwrap_or(0).max(0);

    let entries = subsystem
        .ledger
        .list_for_customer(subsystem.namespace, payer.customer_id, limit, offset)
        .await?;

    Ok(Json(entries))
}

pub async fn get_transaction(
    State(subsystem): State<Arc<PaymentSubsystem>>,
    Extension(payer): Extension<Payer>,
    Path(id): Path<Uuid>,
) -> Result<Json<LedgerEntry>, AppError> {
    subsystem
        .ledger
        .find_for_customer(subsystem.namespace, payer.customer_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))
}
