use crate::domain::order::{OrderStatus, Provider};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Unsupported payment method: {0}")]
    UnsupportedMethod(String),
    #[error("Amount {amount} exceeds the {provider} limit of {max}")]
    LimitExceeded {
        provider: Provider,
        amount: rust_decimal::Decimal,
        max: rust_decimal::Decimal,
    },
    #[error("{0} is not configured on the server")]
    NotConfigured(Provider),
    #[error("{provider} unavailable: {reason}")]
    ProviderUnavailable { provider: Provider, reason: String },
    #[error("{provider} rejected the request ({status}): {message}")]
    ProviderRejected {
        provider: Provider,
        status: u16,
        message: String,
    },
    #[error("{0} does not support status lookups")]
    VerificationUnsupported(Provider),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),
    #[error("Order {0} already exists")]
    DuplicateId(String),
    #[error("Order {0} has a payment initiation in progress")]
    InitiationInProgress(String),
    #[error("Provider reference {0} is already bound to another order")]
    DuplicateReference(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// Stable machine-readable code, surfaced next to the message in HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::UnsupportedMethod(_) => "UNSUPPORTED_METHOD",
            Self::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            Self::NotConfigured(_) => "NOT_CONFIGURED",
            Self::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Self::ProviderRejected { .. } => "PROVIDER_REJECTED",
            Self::VerificationUnsupported(_) => "VERIFICATION_UNSUPPORTED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::SignatureInvalid(_) => "SIGNATURE_INVALID",
            Self::DuplicateId(_) => "DUPLICATE_ID",
            Self::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            Self::InitiationInProgress(_) => "INITIATION_IN_PROGRESS",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether an initiation that failed this way may be attempted again on the same order.
    ///
    /// Only an explicit refusal from the provider is final; everything else
    /// leaves the order in `created`.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::ProviderRejected { .. })
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
