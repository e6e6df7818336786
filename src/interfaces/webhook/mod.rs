//! Authentication of inbound provider webhooks.

pub mod signature;

use crate::config::Settings;
use crate::error::{PaymentError, Result};
use tracing::warn;

/// How a webhook got past authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Signed,
    /// No secret was configured and unsigned deliveries are explicitly allowed.
    Unverified,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookVerifier {
    stripe_secret: Option<String>,
    alma_secret: Option<String>,
    tolerance_secs: i64,
    allow_unsigned: bool,
}

impl WebhookVerifier {
    pub fn new(
        stripe_secret: Option<String>,
        alma_secret: Option<String>,
        tolerance_secs: i64,
        allow_unsigned: bool,
    ) -> Self {
        Self {
            stripe_secret: stripe_secret.filter(|s| !s.is_empty()),
            alma_secret: alma_secret.filter(|s| !s.is_empty()),
            tolerance_secs,
            allow_unsigned,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.stripe_webhook_secret.clone(),
            settings.alma_secret_key.clone(),
            settings.webhook_tolerance_secs,
            settings.allow_unsigned_webhooks,
        )
    }

    pub fn stripe(&self, payload: &[u8], header: Option<&str>) -> Result<Verification> {
        let Some(secret) = &self.stripe_secret else {
            return self.unsigned("stripe");
        };
        let header = header.ok_or_else(|| {
            PaymentError::SignatureInvalid("missing Stripe-Signature header".to_string())
        })?;
        signature::verify_stripe(
            payload,
            header,
            secret,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;
        Ok(Verification::Signed)
    }

    /// Alma signs the payment id. An unsigned notification is only accepted
    /// when unsigned deliveries are allowed. Either way the payment state is
    /// looked up at Alma.
    pub fn alma(&self, payment_id: &str, header: Option<&str>) -> Result<Verification> {
        match (header, &self.alma_secret) {
            (Some(sig), Some(secret)) => {
                signature::verify_alma(payment_id, sig, secret)?;
                Ok(Verification::Signed)
            }
            (None, _) | (_, None) => self.unsigned("alma"),
        }
    }

    fn unsigned(&self, provider: &str) -> Result<Verification> {
        if self.allow_unsigned {
            warn!(provider, "Accepting unverified webhook: no signature to check");
            Ok(Verification::Unverified)
        } else {
            Err(PaymentError::SignatureInvalid(format!(
                "{provider} webhook is not signed or no secret is configured"
            )))
        }
    }
}
