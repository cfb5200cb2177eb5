pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod subsystem;
pub mod utils;

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::adapters::Stores;
use crate::config::GatewayConfig;
use crate::gateway::PaymentGateway;
use crate::services::ReceiptDispatcher;
use crate::subsystem::{build_subsystems, PaymentSubsystem};

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub subsystems: Vec<Arc<PaymentSubsystem>>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<dyn ReceiptDispatcher>,
        config: &GatewayConfig,
    ) -> Self {
        let subsystems = build_subsystems(&stores, gateway, dispatcher, config);
        Self { stores, subsystems }
    }
}

pub fn create_app(state: AppState) -> Router {
    let webhooks = Arc::new(handlers::webhook::webhook_router(&state.subsystems));
    let webhook_routes: Router = Router::new()
        .route("/payment/webhook", post(handlers::webhook::receive))
        .route("/payment/webhook/", post(handlers::webhook::receive))
        .with_state(webhooks);

    let app: Router = Router::new()
        .route("/health", get(handlers::health))
        .with_state(state.clone())
        .merge(webhook_routes);

    let app = state.subsystems.iter().fold(app, |app, subsystem| {
        app.merge(handlers::payment::routes(
            subsystem.clone(),
            state.stores.sessions.clone(),
        ))
    });

    app.layer(axum::middleware::from_fn(
        middleware::request_logger::request_logger_middleware,
    ))
}

/// CORS for the browser-facing payment endpoints. Origins that are not valid
/// header values are skipped.
pub fn cors_layer(origins: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AllowHeaders::mirror_request())
}
