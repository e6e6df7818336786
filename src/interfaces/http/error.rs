//! Bridges `PaymentError` to HTTP responses.

use crate::error::PaymentError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug)]
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

pub fn status_of(err: &PaymentError) -> StatusCode {
    match err {
        PaymentError::InvalidAmount(_)
        | PaymentError::UnsupportedMethod(_)
        | PaymentError::LimitExceeded { .. }
        | PaymentError::InvalidRequest(_)
        | PaymentError::SignatureInvalid(_)
        | PaymentError::VerificationUnsupported(_) => StatusCode::BAD_REQUEST,
        PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::DuplicateId(_)
        | PaymentError::DuplicateReference(_)
        | PaymentError::InitiationInProgress(_)
        | PaymentError::InvalidTransition { .. } => StatusCode::CONFLICT,
        PaymentError::ProviderRejected { .. } => StatusCode::PAYMENT_REQUIRED,
        PaymentError::ProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,
        PaymentError::NotConfigured(_) | PaymentError::Storage(_) | PaymentError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        if status.is_server_error() {
            tracing::error!(%status, code = self.0.code(), error = %self.0, "Request failed");
        }

        // Storage and internal details stay in the log.
        let message = match &self.0 {
            PaymentError::Storage(_) | PaymentError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: message,
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderStatus, Provider};
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(&PaymentError::LimitExceeded {
                provider: Provider::Alma,
                amount: dec!(2500),
                max: dec!(2000)
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(&PaymentError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(&PaymentError::InvalidTransition {
                from: OrderStatus::Paid,
                to: OrderStatus::Failed
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(&PaymentError::NotConfigured(Provider::Alma)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(&PaymentError::ProviderUnavailable {
                provider: Provider::Stripe,
                reason: "timeout".into()
            }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let response = ApiError(PaymentError::Storage("disk on fire".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
