use super::order::{Amount, Currency, Customer, OrderId, OrderStatus, Provider};
use serde::Serialize;

/// What a provider adapter receives to start a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiationRequest {
    pub order_id: OrderId,
    pub amount: Amount,
    pub currency: Currency,
    pub customer: Customer,
    /// Initiation attempt on this order, starting at 1.
    pub attempt: u32,
}

/// The step the storefront has to take next, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NextAction {
    /// Card flow: the client confirms the intent with this secret.
    ClientSecret {
        client_secret: String,
        payment_intent_id: String,
    },
    /// Off-site flow: send the user agent to `redirect_url`.
    Redirect {
        redirect_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider_response: Option<serde_json::Value>,
    },
    /// Nothing left to do online.
    Message { message: String },
}

/// A successful initiation.
#[derive(Debug, Clone, PartialEq)]
pub struct Initiation {
    /// Correlation handle later callbacks carry. `None` for providers without one.
    pub reference: Option<String>,
    pub demo_token: Option<String>,
    pub next_action: NextAction,
}

impl Initiation {
    /// Every handle a later callback may use to find the order: the provider
    /// reference and, when distinct, the demo token.
    pub fn handles(&self) -> impl Iterator<Item = &String> {
        let token = self
            .demo_token
            .as_ref()
            .filter(|token| self.reference.as_ref() != Some(*token));
        self.reference.iter().chain(token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Pending,
}

impl PaymentOutcome {
    /// The order status this outcome settles to, if any.
    pub fn settles_to(&self) -> Option<OrderStatus> {
        match self {
            PaymentOutcome::Succeeded => Some(OrderStatus::Paid),
            PaymentOutcome::Failed => Some(OrderStatus::Failed),
            PaymentOutcome::Pending => None,
        }
    }
}

/// Live status reported by a provider lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    /// Status string exactly as the provider sent it.
    pub raw: String,
    pub outcome: PaymentOutcome,
}

impl ProviderStatus {
    pub fn new(raw: impl Into<String>, outcome: PaymentOutcome) -> Self {
        Self {
            raw: raw.into(),
            outcome,
        }
    }
}

/// A status change pushed by a provider, authenticated and decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub provider: Provider,
    /// Provider event type, kept for logging.
    pub kind: String,
    pub reference: String,
    /// Order id the provider echoed back in its metadata, if any.
    pub order_hint: Option<String>,
    pub outcome: PaymentOutcome,
}
