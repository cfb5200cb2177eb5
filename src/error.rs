use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayUnavailable;
use crate::ports::RepositoryError;
use crate::services::{CheckoutError, ReconcileError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    GatewayUnavailable(#[from] GatewayUnavailable),

    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Malformed payload: {0}")]
    PayloadMalformed(String),

    #[error("Unknown payment reference: {0}")]
    ReferenceUnknown(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // A failed gateway call is reported to the client as a bad request.
            AppError::GatewayUnavailable(_) => StatusCode::BAD_REQUEST,
            AppError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            AppError::PayloadMalformed(_) => StatusCode::BAD_REQUEST,
            AppError::ReferenceUnknown(_) => StatusCode::NOT_FOUND,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error body for the poll and initiate endpoints, which always carry
    /// `paid: false`.
    pub fn into_payment_response(self, reference: Option<&str>) -> Response {
        let status = self.status_code();
        self.log(status);
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "reference": reference,
            "paid": false,
        }));

        (status, body).into_response()
    }

    /// Logs the error and reduces it to its status code, for endpoints that
    /// answer with a bare status.
    pub fn status_only(self) -> StatusCode {
        let status = self.status_code();
        self.log(status);
        status
    }

    fn log(&self, status: StatusCode) {
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::ReferenceUnknown(reference) => AppError::ReferenceUnknown(reference),
            ReconcileError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::NoUnpaidOrders => {
                AppError::BadRequest("No unpaid orders to pay for".to_string())
            }
            CheckoutError::Gateway(e) => AppError::GatewayUnavailable(e),
            CheckoutError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        self.log(status);
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
