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
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct AlmaConfig {
    pub api_url: String,
    pub merchant: Option<String>,
    pub secret_key: Option<String>,
    /// Largest financeable amount, in major units.
    pub max_amount: Decimal,
    pub installments: u8,
    pub client_url: String,
    pub public_url: String,
    /// Issue demo checkout tokens when Alma returns no redirect target.
    pub demo_checkout: bool,
}

impl AlmaConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            api_url: base_url(&settings.alma_api_url)?,
            merchant: settings.alma_merchant.clone(),
            secret_key: settings.alma_secret_key.clone(),
            max_amount: settings.alma_max_amount,
            installments: settings.alma_installments,
            client_url: settings.client_url().to_string(),
            public_url: settings.public_url().to_string(),
            demo_checkout: settings.enable_demo_checkout,
        })
    }
}

/// Deferred-installment payments through Alma.
#[derive(Debug, Clone)]
pub struct AlmaAdapter {
    client: Client,
    config: AlmaConfig,
}

impl AlmaAdapter {
    pub fn new(client: Client, config: AlmaConfig) -> Self {
        Self { client, config }
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (self.config.merchant.as_deref(), self.config.secret_key.as_deref()) {
            (Some(merchant), Some(key)) if !merchant.is_empty() && !key.is_empty() => {
                Ok((merchant, key))
            }
            _ => Err(PaymentError::NotConfigured(Provider::Alma)),
        }
    }
}

/// Fresh single-use token for the demo checkout page.
pub fn demo_token() -> String {
    hex::encode(rand::random::<[u8; 12]>())
}

fn redirect_target(response: &Value) -> Option<String> {
    ["url", "redirect_url", "checkout_url"]
        .iter()
        .filter_map(|key| response.get(*key).and_then(Value::as_str))
        .find(|url| !url.is_empty())
        .map(str::to_string)
}

/// Maps an Alma payment state onto the order lifecycle.
///
/// `in_progress` means the first instalment was captured and Alma carries the
/// remaining risk, so the merchant considers the order paid.
pub fn state_outcome(state: &str) -> PaymentOutcome {
    match state {
        "paid" | "in_progress" => PaymentOutcome::Succeeded,
        "canceled" | "rejected" | "scored_no" => PaymentOutcome::Failed,
        _ => PaymentOutcome::Pending,
    }
}

/// Instant payment notification body. Alma sends the payment id under a few names.
///
/// Only the id is read. The signature covers nothing else, so any state in
/// the body is ignored and the payment is looked up instead.
#[derive(Debug, Deserialize)]
pub struct Notification {
    #[serde(alias = "pid", alias = "payment_id")]
    pub id: String,
}

impl Notification {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| PaymentError::InvalidRequest(format!("malformed Alma notification: {e}")))
    }

    /// The event for this payment, given its state as Alma reported it.
    pub fn into_event(self, status: ProviderStatus) -> ProviderEvent {
        ProviderEvent {
            provider: Provider::Alma,
            kind: format!("payment.{}", status.raw),
            reference: self.id,
            order_hint: None,
            outcome: status.outcome,
        }
    }
}

#[async_trait]
impl PaymentProvider for AlmaAdapter {
    fn provider(&self) -> Provider {
        Provider::Alma
    }

    async fn initiate(&self, request: &InitiationRequest) -> Result<Initiation> {
        if request.amount.value() > self.config.max_amount {
            return Err(PaymentError::LimitExceeded {
                provider: Provider::Alma,
                amount: request.amount.value(),
                max: self.config.max_amount,
            });
        }
        let (merchant, key) = self.credentials()?;

        let mut return_url = Url::parse(&format!("{}/alma/return", self.config.client_url))
            .map_err(|e| PaymentError::InvalidRequest(format!("invalid client URL: {e}")))?;
        return_url
            .query_pairs_mut()
            .append_pair("orderId", request.order_id.as_str());

        let payload = json!({
            "merchant": merchant,
            "amount": request.amount.to_minor_units()?,
            "currency": request.currency,
            "order_reference": request.order_id,
            "installments_count": self.config.installments,
            "return_url": return_url.as_str(),
            "customer": request.customer,
        });
        debug!(order_id = %request.order_id, "POST {}", self.config.api_url);

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| unavailable(Provider::Alma, e))?;
        let body = read_json(Provider::Alma, response).await?;
        let payment_id = body
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let (redirect_url, demo_token) = match redirect_target(&body) {
            Some(url) => (url, None),
            None if self.config.demo_checkout => {
                let token = demo_token();
                info!(order_id = %request.order_id, "Alma returned no redirect, issuing demo checkout");
                (
                    format!("{}/alma/checkout/{}", self.config.public_url, token),
                    Some(token),
                )
            }
            None => {
                return Err(PaymentError::ProviderUnavailable {
                    provider: Provider::Alma,
                    reason: "response carries no redirect target".to_string(),
                });
            }
        };

        let reference = payment_id
            .or_else(|| demo_token.clone())
            .ok_or_else(|| PaymentError::ProviderUnavailable {
                provider: Provider::Alma,
                reason: "response carries no payment id".to_string(),
            })?;

        Ok(Initiation {
            reference: Some(reference),
            demo_token,
            next_action: NextAction::Redirect {
                redirect_url,
                provider_response: Some(body),
            },
        })
    }

    async fn verify(&self, reference: &str) -> Result<ProviderStatus> {
        let (_, key) = self.credentials()?;
        let url = format!("{}/{}", self.config.api_url, reference);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| unavailable(Provider::Alma, e))?;
        let body = read_json(Provider::Alma, response).await?;
        let state = body
            .get("state")
            .and_then(Value::as_str)
            .ok_or_else(|| PaymentError::ProviderUnavailable {
                provider: Provider::Alma,
                reason: "payment has no state".to_string(),
            })?;

        Ok(ProviderStatus::new(state, state_outcome(state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Amount, Currency, Customer, OrderId};
    use rust_decimal_macros::dec;

    fn config() -> AlmaConfig {
        AlmaConfig {
            // Nothing listens here; any outbound call would fail loudly.
            api_url: "http://127.0.0.1:9/v1/payments".to_string(),
            merchant: None,
            secret_key: None,
            max_amount: dec!(2000),
            installments: 3,
            client_url: "http://localhost:3000".to_string(),
            public_url: "http://localhost:8000".to_string(),
            demo_checkout: false,
        }
    }

    fn request(amount: Decimal) -> InitiationRequest {
        InitiationRequest {
            order_id: OrderId::parse("ord_1").unwrap(),
            amount: Amount::new(amount).unwrap(),
            currency: Currency::parse("eur").unwrap(),
            customer: Customer::default(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_limit_checked_before_credentials() {
        let adapter = AlmaAdapter::new(Client::new(), config());
        assert!(matches!(
            adapter.initiate(&request(dec!(2500))).await,
            Err(PaymentError::LimitExceeded { .. })
        ));
        // At the cap the credentials check is reached instead.
        assert!(matches!(
            adapter.initiate(&request(dec!(2000))).await,
            Err(PaymentError::NotConfigured(Provider::Alma))
        ));
    }

    #[test]
    fn test_redirect_target_fallbacks() {
        assert_eq!(
            redirect_target(&json!({"url": "https://a"})).as_deref(),
            Some("https://a")
        );
        assert_eq!(
            redirect_target(&json!({"url": "", "checkout_url": "https://c"})).as_deref(),
            Some("https://c")
        );
        assert_eq!(redirect_target(&json!({"id": "payment_1"})), None);
    }

    #[test]
    fn test_demo_tokens_are_unique_hex() {
        let a = demo_token();
        let b = demo_token();
        assert_eq!(a.len(), 24);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_notification_aliases() {
        let n = Notification::parse(br#"{"pid":"payment_1"}"#).unwrap();
        assert_eq!(n.id, "payment_1");

        // A state in the body carries no weight; the looked-up status decides.
        let n = Notification::parse(br#"{"payment_id":"payment_2","state":"paid"}"#).unwrap();
        let event = n.into_event(ProviderStatus::new("not_started", PaymentOutcome::Pending));
        assert_eq!(event.reference, "payment_2");
        assert_eq!(event.kind, "payment.not_started");
        assert_eq!(event.outcome, PaymentOutcome::Pending);
    }

    #[test]
    fn test_state_outcome_mapping() {
        assert_eq!(state_outcome("in_progress"), PaymentOutcome::Succeeded);
        assert_eq!(state_outcome("canceled"), PaymentOutcome::Failed);
        assert_eq!(state_outcome("not_started"), PaymentOutcome::Pending);
    }
}
