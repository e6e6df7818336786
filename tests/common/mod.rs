#![allow(dead_code)]

use axum_test::TestServer;
use payflow::config::Settings;
use payflow::domain::order::{OrderId, OrderStatus};
use payflow::domain::ports::{OrderStore, SharedOrderStore};
use payflow::infrastructure::in_memory::InMemoryOrderStore;
use payflow::infrastructure::providers::ProviderRegistry;
use payflow::interfaces::http::{AppState, router};
use std::sync::Arc;
use wiremock::MockServer;

pub const STRIPE_KEY: &str = "sk_test_123";
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";
pub const ALMA_MERCHANT: &str = "merchant_1";
pub const ALMA_KEY: &str = "sk_alma_123";

/// Settings pointing both providers at a local mock.
pub fn settings(provider_mock: &MockServer) -> Settings {
    Settings {
        stripe_api_url: provider_mock.uri(),
        stripe_secret_key: Some(STRIPE_KEY.to_string()),
        stripe_webhook_secret: Some(STRIPE_WEBHOOK_SECRET.to_string()),
        alma_api_url: format!("{}/v1/payments", provider_mock.uri()),
        alma_merchant: Some(ALMA_MERCHANT.to_string()),
        alma_secret_key: Some(ALMA_KEY.to_string()),
        provider_timeout_ms: 2_000,
        ..Settings::default()
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: SharedOrderStore,
}

impl TestApp {
    pub fn new(settings: &Settings) -> Self {
        let store: SharedOrderStore = Arc::new(InMemoryOrderStore::new());
        let providers = ProviderRegistry::from_settings(settings).unwrap();
        let state = AppState::new(store.clone(), providers, settings).unwrap();
        let server = TestServer::new(router(state)).unwrap();
        Self { server, store }
    }

    pub async fn status_of(&self, order_id: &str) -> OrderStatus {
        self.store
            .get(&OrderId::parse(order_id).unwrap())
            .await
            .unwrap()
            .status
    }
}

pub fn stripe_event(kind: &str, intent_id: &str, order_id: Option<&str>) -> String {
    let metadata = match order_id {
        Some(id) => serde_json::json!({ "orderId": id }),
        None => serde_json::json!({}),
    };
    serde_json::json!({
        "id": format!("evt_{intent_id}"),
        "type": kind,
        "data": {
            "object": {
                "id": intent_id,
                "object": "payment_intent",
                "status": "succeeded",
                "metadata": metadata,
            }
        }
    })
    .to_string()
}
