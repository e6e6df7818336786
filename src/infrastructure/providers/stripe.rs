use super::{base_url, read_json, unavailable};
use crate::config::Settings;
use crate::domain::order::Provider;
use crate::domain::payment::{
    Initiation, InitiationRequest, NextAction, PaymentOutcome, ProviderEvent, ProviderStatus,
};
use crate::domain::ports::PaymentProvider;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: Option<String>,
}

impl StripeConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            api_url: base_url(&settings.stripe_api_url)?,
            secret_key: settings.stripe_secret_key.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Card payments through Stripe payment intents.
#[derive(Debug, Clone)]
pub struct StripeAdapter {
    client: Client,
    config: StripeConfig,
}

impl StripeAdapter {
    pub fn new(client: Client, config: StripeConfig) -> Self {
        Self { client, config }
    }

    fn secret_key(&self) -> Result<&str> {
        self.config
            .secret_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(PaymentError::NotConfigured(Provider::Stripe))
    }

    fn malformed(err: serde_json::Error) -> PaymentError {
        PaymentError::ProviderUnavailable {
            provider: Provider::Stripe,
            reason: format!("unexpected payment intent shape: {err}"),
        }
    }
}

/// Maps a payment intent status onto the order lifecycle.
///
/// `requires_capture` means the funds are authorised and held, which the
/// storefront treats as paid.
pub fn intent_outcome(status: &str) -> PaymentOutcome {
    match status {
        "succeeded" | "requires_capture" => PaymentOutcome::Succeeded,
        "canceled" => PaymentOutcome::Failed,
        _ => PaymentOutcome::Pending,
    }
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: PaymentIntent,
}

/// Decodes an already-authenticated webhook body.
///
/// Returns `None` for event types that carry no payment outcome.
pub fn parse_event(payload: &[u8]) -> Result<Option<ProviderEvent>> {
    let raw: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| PaymentError::InvalidRequest(format!("malformed Stripe event: {e}")))?;
    let kind = raw
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();

    let outcome = match kind {
        "payment_intent.succeeded" => PaymentOutcome::Succeeded,
        "payment_intent.payment_failed" | "payment_intent.canceled" => PaymentOutcome::Failed,
        _ => return Ok(None),
    };

    let event: Event = serde_json::from_value(raw)
        .map_err(|e| PaymentError::InvalidRequest(format!("malformed Stripe event: {e}")))?;
    let mut intent = event.data.object;
    Ok(Some(ProviderEvent {
        provider: Provider::Stripe,
        kind: event.kind,
        order_hint: intent.metadata.remove("orderId"),
        reference: intent.id,
        outcome,
    }))
}

#[async_trait]
impl PaymentProvider for StripeAdapter {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    async fn initiate(&self, request: &InitiationRequest) -> Result<Initiation> {
        let key = self.secret_key()?;
        let amount = request.amount.to_minor_units()?;
        let url = format!("{}/v1/payment_intents", self.config.api_url);
        debug!(order_id = %request.order_id, amount, "POST {}", url);

        let form = [
            ("amount", amount.to_string()),
            ("currency", request.currency.to_string()),
            ("description", format!("Order {}", request.order_id)),
            ("metadata[orderId]", request.order_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .header(
                "Idempotency-Key",
                format!("pi-{}-{}", request.order_id, request.attempt),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| unavailable(Provider::Stripe, e))?;

        let intent: PaymentIntent =
            serde_json::from_value(read_json(Provider::Stripe, response).await?)
                .map_err(Self::malformed)?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::ProviderUnavailable {
                provider: Provider::Stripe,
                reason: "payment intent has no client secret".to_string(),
            })?;

        Ok(Initiation {
            reference: Some(intent.id.clone()),
            demo_token: None,
            next_action: NextAction::ClientSecret {
                client_secret,
                payment_intent_id: intent.id,
            },
        })
    }

    async fn verify(&self, reference: &str) -> Result<ProviderStatus> {
        let key = self.secret_key()?;
        let url = format!("{}/v1/payment_intents/{}", self.config.api_url, reference);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| unavailable(Provider::Stripe, e))?;
        let intent: PaymentIntent =
            serde_json::from_value(read_json(Provider::Stripe, response).await?)
                .map_err(Self::malformed)?;

        Ok(ProviderStatus::new(
            intent.status.clone(),
            intent_outcome(&intent.status),
        ))
    }
}
