use super::AppState;
use super::error::ApiError;
use crate::application::orchestrator::PaymentRequest;
use crate::application::reconciliation::ReconciliationOutcome;
use crate::domain::order::{Customer, Order, OrderId, OrderStatus, Provider};
use crate::domain::payment::NextAction;
use crate::error::{PaymentError, Result};
use crate::infrastructure::providers::{alma, stripe};
use axum::{
    Form, Json,
    body::Bytes,
    extract::{Path, State, rejection::FormRejection, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::str::FromStr;
use tracing::{error, warn};
use url::Url;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const ALMA_SIGNATURE_HEADER: &str = "x-alma-signature";

/// Runs `work` on its own task so a dropped client connection does not
/// cancel a provider call or a store update halfway.
async fn detached<T, F>(work: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| PaymentError::Internal(Box::new(e)))?
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| PaymentError::InvalidRequest(rejection.body_text()))
}

/// Accepts the amount as a JSON number or a numeric string, in major units.
fn parse_amount(raw: &Value) -> Result<Decimal> {
    let parsed = match raw {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text))
        }
        Value::String(s) => Decimal::from_str(s.trim()),
        _ => return Err(PaymentError::InvalidAmount("amount is required".to_string())),
    };
    parsed.map_err(|_| PaymentError::InvalidAmount(format!("'{raw}' is not a number")))
}

#[derive(Debug, Deserialize)]
pub struct OrderDto {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub customer: Customer,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentBody {
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, alias = "paymentMethod")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub order: Option<OrderDto>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub provider: Provider,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub next_action: NextAction,
}

/// `POST /payment`
pub async fn create_payment(
    State(state): State<AppState>,
    body: std::result::Result<Json<CreatePaymentBody>, JsonRejection>,
) -> std::result::Result<Json<PaymentResponse>, ApiError> {
    let body = json_body(body)?;
    let payment_method = body
        .payment_method
        .ok_or_else(|| PaymentError::InvalidRequest("payment_method is required".to_string()))?;
    let (order_id, customer) = match body.order {
        Some(order) => (order.id, order.customer),
        None => (None, Customer::default()),
    };
    let request = PaymentRequest {
        amount: parse_amount(&body.amount)?,
        currency: body.currency,
        payment_method,
        order_id,
        customer,
    };

    let orchestrator = state.orchestrator.clone();
    let created = detached(async move { orchestrator.create_payment(request).await }).await?;

    Ok(Json(PaymentResponse {
        provider: created.provider,
        order_id: created.order_id,
        status: created.status,
        next_action: created.next_action,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default, rename = "orderId", alias = "order_id")]
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub status: String,
}

/// `PATCH /payment/confirm`
pub async fn confirm_payment(
    State(state): State<AppState>,
    body: std::result::Result<Json<ConfirmBody>, JsonRejection>,
) -> std::result::Result<Json<ConfirmResponse>, ApiError> {
    let body = json_body(body)?;
    let reference = body
        .payment_intent_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| PaymentError::InvalidRequest("Missing payment_intent_id".to_string()))?;
    let order_id = body.order_id.map(OrderId::parse).transpose()?;

    let engine = state.reconciliation.clone();
    let confirmation =
        detached(async move { engine.confirm(&reference, order_id.as_ref()).await }).await?;

    Ok(Json(ConfirmResponse {
        success: confirmation.success,
        status: confirmation.status,
    }))
}

/// Turns a reconciliation result into the provider-facing answer.
///
/// Business outcomes are always acknowledged so the provider stops
/// retrying; only infrastructure failures ask for a redelivery.
fn acknowledge(
    provider: Provider,
    result: Result<ReconciliationOutcome>,
) -> std::result::Result<Json<Value>, ApiError> {
    match result {
        Ok(_) => Ok(Json(json!({ "received": true }))),
        Err(
            err @ (PaymentError::Storage(_)
            | PaymentError::Internal(_)
            | PaymentError::ProviderUnavailable { .. }),
        ) => {
            error!(%provider, error = %err, "Webhook could not be processed, asking for redelivery");
            Err(ApiError(err))
        }
        Err(err) => {
            warn!(%provider, error = %err, "Webhook acknowledged without effect");
            Ok(Json(json!({ "received": true })))
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// `POST /webhook/stripe`
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<Value>, ApiError> {
    if let Err(err) = state
        .verifier
        .stripe(&body, header(&headers, STRIPE_SIGNATURE_HEADER))
    {
        warn!(error = %err, "Stripe webhook signature verification failed");
        return Err(ApiError(err));
    }

    let event = match stripe::parse_event(&body) {
        Ok(Some(event)) => event,
        Ok(None) => return Ok(Json(json!({ "received": true }))),
        Err(err) => {
            warn!(error = %err, "Undecodable Stripe event acknowledged");
            return Ok(Json(json!({ "received": true })));
        }
    };

    let engine = state.reconciliation.clone();
    let result = detached(async move { engine.apply_event(event).await }).await;
    acknowledge(Provider::Stripe, result)
}

/// `POST /webhook/alma`
pub async fn alma_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<Value>, ApiError> {
    let notification = match alma::Notification::parse(&body) {
        Ok(notification) => notification,
        Err(err) => {
            warn!(error = %err, "Undecodable Alma notification acknowledged");
            return Ok(Json(json!({ "received": true })));
        }
    };

    if let Err(err) = state
        .verifier
        .alma(&notification.id, header(&headers, ALMA_SIGNATURE_HEADER))
    {
        warn!(payment_id = %notification.id, error = %err, "Alma webhook signature verification failed");
        return Err(ApiError(err));
    }

    let engine = state.reconciliation.clone();
    let result =
        detached(async move { engine.apply_alma_notification(notification).await }).await;
    acknowledge(Provider::Alma, result)
}

/// What a third reader sees of an order. Demo tokens stay private.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_id: OrderId,
    pub provider: Provider,
    pub status: OrderStatus,
    pub amount: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        let provider_reference = order
            .provider_reference
            .filter(|reference| order.demo_token.as_ref() != Some(reference));
        Self {
            order_id: order.id,
            provider: order.provider,
            status: order.status,
            amount: order.amount.value(),
            currency: order.currency.as_str().to_string(),
            provider_reference,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// `GET /orders/:id`
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<OrderView>, ApiError> {
    let id = OrderId::parse(id)?;
    let order = state.store.get(&id).await?;
    Ok(Json(order.into()))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `GET /alma/checkout/:token` (demo only)
pub async fn demo_checkout(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    match state.reconciliation.demo_checkout(&token).await {
        Ok(order) => {
            let order_id = escape_html(order.id.as_str());
            let token = escape_html(&token);
            Html(format!(
                r#"<html>
  <body>
    <h1>Alma Demo Checkout</h1>
    <p>Simulating Alma checkout for order {order_id}. Click to complete payment (demo).</p>
    <form method="post" action="/alma/complete">
      <input type="hidden" name="orderId" value="{order_id}" />
      <input type="hidden" name="token" value="{token}" />
      <button type="submit">Complete Payment (simulate)</button>
    </form>
  </body>
</html>"#
            ))
            .into_response()
        }
        Err(PaymentError::NotFound(_)) => (StatusCode::NOT_FOUND, "Invalid token").into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CompleteForm {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(default)]
    pub token: String,
}

fn success_url(client_url: &str, order_id: &OrderId) -> Result<String> {
    let mut url = Url::parse(&format!("{client_url}/order/success"))
        .map_err(|e| PaymentError::Internal(Box::new(e)))?;
    url.query_pairs_mut().append_pair("orderId", order_id.as_str());
    Ok(url.into())
}

/// `POST /alma/complete` (demo only)
pub async fn complete_demo(
    State(state): State<AppState>,
    form: std::result::Result<Form<CompleteForm>, FormRejection>,
) -> Response {
    let Ok(Form(form)) = form else {
        return (StatusCode::BAD_REQUEST, "Order not found").into_response();
    };
    let Ok(order_id) = OrderId::parse(form.order_id) else {
        return (StatusCode::BAD_REQUEST, "Order not found").into_response();
    };

    let engine = state.reconciliation.clone();
    let id = order_id.clone();
    let result = detached(async move { engine.complete_demo(&id, &form.token).await }).await;

    match result {
        Ok(ReconciliationOutcome::Conflict { current, .. }) => (
            StatusCode::CONFLICT,
            format!("Order is already {current}"),
        )
            .into_response(),
        Ok(_) => match success_url(&state.client_url, &order_id) {
            Ok(url) => Redirect::to(&url).into_response(),
            Err(err) => ApiError(err).into_response(),
        },
        Err(PaymentError::NotFound(_)) => {
            (StatusCode::BAD_REQUEST, "Order not found").into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount_accepts_numbers_and_strings() {
        assert_eq!(parse_amount(&json!(50)).unwrap(), dec!(50));
        assert_eq!(parse_amount(&json!(19.99)).unwrap(), dec!(19.99));
        assert_eq!(parse_amount(&json!(" 100.5 ")).unwrap(), dec!(100.5));
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        for raw in [json!("abc"), json!(null), json!(true), json!({})] {
            assert!(matches!(
                parse_amount(&raw),
                Err(PaymentError::InvalidAmount(_))
            ));
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_success_url_encodes_order_id() {
        let id = OrderId::parse("ord 1&x=2").unwrap();
        assert_eq!(
            success_url("http://localhost:3000", &id).unwrap(),
            "http://localhost:3000/order/success?orderId=ord+1%26x%3D2"
        );
    }
}
