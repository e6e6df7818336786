use super::payment::Initiation;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, immutable order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Accepts a client-supplied identifier. Blank identifiers are refused.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PaymentError::InvalidRequest(
                "order id must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Server-side identifier for orders the client did not name.
    pub fn generate() -> Self {
        Self(format!("ord_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Positive amount in the order's major currency unit.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::InvalidAmount(format!(
                "amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Converts to minor units (cents), rounding half away from zero.
    pub fn to_minor_units(&self) -> Result<i64> {
        (self.0 * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .filter(|minor| *minor > 0)
            .ok_or_else(|| {
                PaymentError::InvalidAmount(format!("{} cannot be expressed in minor units", self.0))
            })
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// ISO-4217 code, stored lowercase the way card processors expect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_lowercase()))
        } else {
            Err(PaymentError::InvalidRequest(format!(
                "invalid currency code '{code}'"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Buyer details. Free-form at this layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, alias = "customerName")]
    pub name: Option<String>,
    #[serde(default, alias = "customerEmail")]
    pub email: Option<String>,
    #[serde(default, alias = "customerPhone")]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Stripe,
    Alma,
    Cod,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Stripe, Provider::Alma, Provider::Cod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::Alma => "alma",
            Provider::Cod => "cod",
        }
    }

    /// The state an order enters once this provider accepted the initiation.
    pub fn pending_status(&self) -> OrderStatus {
        match self {
            Provider::Stripe => OrderStatus::PendingCard,
            Provider::Alma => OrderStatus::PendingInstallment,
            Provider::Cod => OrderStatus::CodPlaced,
        }
    }
}

impl FromStr for Provider {
    type Err = PaymentError;

    /// Resolves the payment method names storefronts send, case-insensitively.
    fn from_str(method: &str) -> Result<Self> {
        let normalized: String = method
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "stripe" | "card" => Ok(Provider::Stripe),
            "alma" => Ok(Provider::Alma),
            "cod" | "cashondelivery" => Ok(Provider::Cod),
            _ => Err(PaymentError::UnsupportedMethod(method.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    PendingCard,
    PendingInstallment,
    CodPlaced,
    Paid,
    Failed,
}

/// Result of applying a valid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changed.
    Applied { from: OrderStatus, to: OrderStatus },
    /// The order already was in the requested state.
    Unchanged(OrderStatus),
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::PendingCard => "pending_card",
            OrderStatus::PendingInstallment => "pending_installment",
            OrderStatus::CodPlaced => "cod_placed",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Failed)
    }

    fn can_move_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Created => matches!(next, PendingCard | PendingInstallment | CodPlaced | Failed),
            PendingCard | PendingInstallment | CodPlaced => matches!(next, Paid | Failed),
            Paid | Failed => false,
        }
    }

    /// Checks `self -> next` against the lifecycle.
    ///
    /// Re-entering the current state is a no-op, which makes repeated
    /// terminal deliveries harmless.
    pub fn transition(&self, next: OrderStatus) -> Result<Transition> {
        if *self == next {
            Ok(Transition::Unchanged(next))
        } else if self.can_move_to(next) {
            Ok(Transition::Applied {
                from: *self,
                to: next,
            })
        } else {
            Err(PaymentError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One purchase and its payment lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer: Customer,
    pub amount: Amount,
    pub currency: Currency,
    pub provider: Provider,
    pub status: OrderStatus,
    /// Correlation handle assigned at initiation (payment intent id, Alma payment id or demo token).
    pub provider_reference: Option<String>,
    /// Single-use token bound to the demo checkout page, if one was issued.
    pub demo_token: Option<String>,
    /// Initiation attempts started so far. Keys provider-side idempotency.
    #[serde(default)]
    pub initiation_attempts: u32,
    /// Set while a provider call for this order is in flight.
    #[serde(default)]
    pub initiating: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: OrderId,
        customer: Customer,
        amount: Amount,
        currency: Currency,
        provider: Provider,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            customer,
            amount,
            currency,
            provider,
            status: OrderStatus::Created,
            provider_reference: None,
            demo_token: None,
            initiation_attempts: 0,
            initiating: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reserves a `created` order for one provider call and returns the attempt number.
    ///
    /// Fails with `DuplicateId` once the order left `created`, and with
    /// `InitiationInProgress` while another attempt holds the reservation.
    pub fn claim_initiation(&mut self) -> Result<u32> {
        if self.status != OrderStatus::Created {
            return Err(PaymentError::DuplicateId(self.id.to_string()));
        }
        if self.initiating {
            return Err(PaymentError::InitiationInProgress(self.id.to_string()));
        }
        self.initiating = true;
        self.initiation_attempts += 1;
        self.updated_at = Utc::now();
        Ok(self.initiation_attempts)
    }

    pub fn release_initiation(&mut self) {
        self.initiating = false;
    }

    /// Binds the provider handles and leaves `created`. Handles are written
    /// once: an order that already left `created` is refused untouched.
    pub fn bind_initiation(&mut self, initiation: &Initiation, next: OrderStatus) -> Result<()> {
        if self.status != OrderStatus::Created {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if let Transition::Unchanged(_) = self.status.transition(next)? {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.provider_reference = initiation.reference.clone();
        self.demo_token = initiation.demo_token.clone();
        self.initiating = false;
        self.apply(next)?;
        Ok(())
    }

    /// Moves the order to `next` if the lifecycle allows it. On error the order is untouched.
    pub fn apply(&mut self, next: OrderStatus) -> Result<Transition> {
        let transition = self.status.transition(next)?;
        if let Transition::Applied { to, .. } = transition {
            self.status = to;
            self.updated_at = Utc::now();
        }
        Ok(transition)
    }
}
