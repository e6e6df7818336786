//! Inbound HTTP surface.
//!
//! # Routes
//!
//! - `POST /payment` - create an order and start its payment
//! - `PATCH /payment/confirm` - poll the provider and settle the order
//! - `POST /webhook/stripe`, `POST /webhook/alma` - provider pushes
//! - `GET /orders/:id` - read-only order view
//! - `GET /health` - liveness check
//! - `GET /alma/checkout/:token`, `POST /alma/complete` - demo checkout,
//!   mounted only when enabled

pub mod error;
pub mod handlers;

use crate::application::orchestrator::PaymentOrchestrator;
use crate::application::reconciliation::ReconciliationEngine;
use crate::config::Settings;
use crate::domain::order::Currency;
use crate::domain::ports::SharedOrderStore;
use crate::error::Result;
use crate::infrastructure::providers::ProviderRegistry;
use crate::interfaces::webhook::WebhookVerifier;
use axum::{
    Router,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: PaymentOrchestrator,
    pub reconciliation: ReconciliationEngine,
    pub store: SharedOrderStore,
    pub verifier: Arc<WebhookVerifier>,
    pub client_url: Arc<str>,
    pub demo_checkout: bool,
}

impl AppState {
    pub fn new(
        store: SharedOrderStore,
        providers: ProviderRegistry,
        settings: &Settings,
    ) -> Result<Self> {
        let default_currency = Currency::parse(&settings.default_currency)?;
        Ok(Self {
            orchestrator: PaymentOrchestrator::new(
                store.clone(),
                providers.clone(),
                default_currency,
            ),
            reconciliation: ReconciliationEngine::new(store.clone(), providers),
            store,
            verifier: Arc::new(WebhookVerifier::from_settings(settings)),
            client_url: Arc::from(settings.client_url()),
            demo_checkout: settings.enable_demo_checkout,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/payment", post(handlers::create_payment))
        .route("/payment/confirm", patch(handlers::confirm_payment))
        .route("/webhook/stripe", post(handlers::stripe_webhook))
        .route("/webhook/alma", post(handlers::alma_webhook))
        .route("/orders/:id", get(handlers::get_order))
        .route("/health", get(handlers::health));

    if state.demo_checkout {
        router = router
            .route("/alma/checkout/:token", get(handlers::demo_checkout))
            .route("/alma/complete", post(handlers::complete_demo));
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
