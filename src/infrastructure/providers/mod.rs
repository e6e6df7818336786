//! Provider adapters: one `PaymentProvider` per payment method.
//!
//! Outbound calls share one `reqwest::Client` with a bounded timeout. Every
//! failure is classified at this boundary: transport errors, timeouts and 5xx
//! answers become `ProviderUnavailable`, 4xx answers become `ProviderRejected`.

pub mod alma;
pub mod cod;
pub mod stripe;

use crate::config::Settings;
use crate::domain::order::Provider;
use crate::domain::ports::SharedPaymentProvider;
use crate::error::{PaymentError, Result};
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub use alma::{AlmaAdapter, AlmaConfig};
pub use cod::CodAdapter;
pub use stripe::{StripeAdapter, StripeConfig};

/// Closed set of adapters, selected by provider tag.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, SharedPaymentProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` under the provider it reports, replacing any previous one.
    pub fn with(mut self, adapter: SharedPaymentProvider) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    /// Builds the live adapters. Missing credentials do not fail here; the
    /// affected adapter answers `NotConfigured` when it is used.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = build_client(settings.provider_timeout())?;

        let stripe = StripeAdapter::new(client.clone(), StripeConfig::from_settings(settings)?);
        let alma = AlmaAdapter::new(client, AlmaConfig::from_settings(settings)?);

        Ok(Self::new()
            .with(Arc::new(stripe))
            .with(Arc::new(alma))
            .with(Arc::new(CodAdapter)))
    }

    pub fn get(&self, provider: Provider) -> Result<SharedPaymentProvider> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| PaymentError::UnsupportedMethod(provider.to_string()))
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PaymentError::Internal(Box::new(e)))
}

/// Validates a configured base URL and strips any trailing slash.
pub(crate) fn base_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| PaymentError::InvalidRequest(format!("invalid provider URL '{raw}': {e}")))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

pub(crate) fn unavailable(provider: Provider, err: reqwest::Error) -> PaymentError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    PaymentError::ProviderUnavailable { provider, reason }
}

/// Reads a provider response as JSON, classifying non-success statuses.
pub(crate) async fn read_json(provider: Provider, response: Response) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| unavailable(provider, e))?;

    if status.is_success() {
        return serde_json::from_str(&text).map_err(|e| PaymentError::ProviderUnavailable {
            provider,
            reason: format!("malformed response: {e}"),
        });
    }

    warn!(%provider, %status, body = %text, "Provider call failed");
    if status.is_client_error() {
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::NotFound(format!("{provider} resource")));
        }
        Err(PaymentError::ProviderRejected {
            provider,
            status: status.as_u16(),
            message: error_message(&text),
        })
    } else {
        Err(PaymentError::ProviderUnavailable {
            provider,
            reason: format!("HTTP {status}"),
        })
    }
}

/// Pulls a human-readable message out of the common provider error shapes.
fn error_message(body: &str) -> String {
    let json: Option<Value> = serde_json::from_str(body).ok();
    json.as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .or_else(|| v.get("error"))
        })
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect())
}
