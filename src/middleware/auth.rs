use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::ports::SessionRepository;

/// Resolves `Authorization: Bearer <session token>` to the customer and puts
/// the `Payer` into request extensions.
pub async fn customer_auth<B>(
    State(sessions): State<Arc<dyn SessionRepository>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let payer = sessions
        .resolve_session(token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))?;

    req.extensions_mut().insert(payer);
    Ok(next.run(req).await)
}
