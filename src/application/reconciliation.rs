use crate::domain::order::{Order, OrderId, OrderStatus, Provider, Transition};
use crate::domain::payment::{PaymentOutcome, ProviderEvent};
use crate::domain::ports::SharedOrderStore;
use crate::error::{PaymentError, Result};
use crate::infrastructure::providers::ProviderRegistry;
use crate::infrastructure::providers::alma::Notification;
use tracing::{debug, info, warn};

/// Where a transition request came from. Used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Confirmation,
    Webhook,
    DemoReturn,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Channel::Confirmation => "confirmation",
            Channel::Webhook => "webhook",
            Channel::DemoReturn => "demo_return",
        })
    }
}

/// What a reconciliation attempt did to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// The order moved into this state. Happens at most once per terminal state.
    Applied(OrderStatus),
    /// The order already was in this state; nothing was reprocessed.
    Duplicate(OrderStatus),
    /// The input did not concern a known order or carried no outcome.
    Ignored,
    /// The order already settled differently; the existing state wins.
    Conflict {
        current: OrderStatus,
        attempted: OrderStatus,
    },
}

/// Answer to an explicit confirmation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub success: bool,
    /// Status string as reported by the provider.
    pub status: String,
    pub outcome: ReconciliationOutcome,
}

/// Applies status changes from confirmations, webhooks and demo returns to
/// the order store, converging on one terminal state per order.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: SharedOrderStore,
    providers: ProviderRegistry,
}

impl ReconciliationEngine {
    pub fn new(store: SharedOrderStore, providers: ProviderRegistry) -> Self {
        Self { store, providers }
    }

    /// Polls the provider for the payment behind `reference` and settles the
    /// order if it succeeded. Any other status is reported without touching the order.
    pub async fn confirm(&self, reference: &str, order_id: Option<&OrderId>) -> Result<Confirmation> {
        let order = self.store.find_by_provider_reference(reference).await?;
        if let Some(expected) = order_id
            && *expected != order.id
        {
            warn!(reference, claimed = %expected, owner = %order.id, "Confirmation for mismatched order");
            return Err(PaymentError::NotFound(format!(
                "order {expected} with payment {reference}"
            )));
        }

        if order.demo_token.as_deref() == Some(reference) {
            debug!(order_id = %order.id, "Demo payment has no provider status to poll");
            return Err(PaymentError::VerificationUnsupported(order.provider));
        }

        let adapter = self.providers.get(order.provider)?;
        let status = adapter.verify(reference).await?;

        if status.outcome == PaymentOutcome::Succeeded {
            let outcome = self
                .settle(&order.id, OrderStatus::Paid, Channel::Confirmation)
                .await?;
            let success = !matches!(outcome, ReconciliationOutcome::Conflict { .. });
            Ok(Confirmation {
                success,
                status: status.raw,
                outcome,
            })
        } else {
            debug!(order_id = %order.id, status = %status.raw, "Payment not settled yet");
            Ok(Confirmation {
                success: false,
                status: status.raw,
                outcome: ReconciliationOutcome::Ignored,
            })
        }
    }

    /// Applies an authenticated provider event. Unknown references are
    /// logged and ignored so the provider stops retrying.
    pub async fn apply_event(&self, event: ProviderEvent) -> Result<ReconciliationOutcome> {
        let Some(target) = event.outcome.settles_to() else {
            debug!(kind = %event.kind, reference = %event.reference, "Event carries no settlement");
            return Ok(ReconciliationOutcome::Ignored);
        };

        let Some(order) = self.lookup(&event.reference).await? else {
            warn!(
                provider = %event.provider,
                kind = %event.kind,
                reference = %event.reference,
                "Webhook for unknown payment reference"
            );
            return Ok(ReconciliationOutcome::Ignored);
        };

        if order.provider != event.provider {
            warn!(
                order_id = %order.id,
                expected = %order.provider,
                got = %event.provider,
                "Webhook from a provider the order does not use"
            );
            return Ok(ReconciliationOutcome::Ignored);
        }
        if let Some(hint) = &event.order_hint
            && hint != order.id.as_str()
        {
            warn!(order_id = %order.id, hint = %hint, "Webhook metadata names a different order");
            return Ok(ReconciliationOutcome::Ignored);
        }

        self.settle(&order.id, target, Channel::Webhook).await
    }

    /// Handles an Alma payment notification. The outcome always comes from a
    /// lookup at Alma; the notification only names the payment.
    pub async fn apply_alma_notification(
        &self,
        notification: Notification,
    ) -> Result<ReconciliationOutcome> {
        let Some(order) = self.lookup(&notification.id).await? else {
            warn!(reference = %notification.id, "Alma notification for unknown payment");
            return Ok(ReconciliationOutcome::Ignored);
        };
        if order.demo_token.as_deref() == Some(notification.id.as_str()) {
            debug!(order_id = %order.id, "Demo payment cannot be looked up at Alma");
            return Ok(ReconciliationOutcome::Ignored);
        }

        let status = self
            .providers
            .get(Provider::Alma)?
            .verify(&notification.id)
            .await?;
        self.apply_event(notification.into_event(status)).await
    }

    /// Looks up the order a demo checkout token was issued for.
    pub async fn demo_checkout(&self, token: &str) -> Result<Order> {
        let order = self.store.find_by_provider_reference(token).await?;
        if order.demo_token.as_deref() != Some(token) {
            return Err(PaymentError::NotFound(format!("demo checkout {token}")));
        }
        Ok(order)
    }

    /// Completes a demo checkout. Only the order the token was issued for can be settled this way.
    pub async fn complete_demo(&self, order_id: &OrderId, token: &str) -> Result<ReconciliationOutcome> {
        let order = self.store.get(order_id).await?;
        if order.provider != Provider::Alma || order.demo_token.as_deref() != Some(token) {
            warn!(order_id = %order_id, "Demo completion with a token not issued for this order");
            return Err(PaymentError::NotFound(format!("demo checkout for order {order_id}")));
        }
        self.settle(order_id, OrderStatus::Paid, Channel::DemoReturn)
            .await
    }

    async fn lookup(&self, reference: &str) -> Result<Option<Order>> {
        match self.store.find_by_provider_reference(reference).await {
            Ok(order) => Ok(Some(order)),
            Err(PaymentError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn settle(
        &self,
        id: &OrderId,
        target: OrderStatus,
        channel: Channel,
    ) -> Result<ReconciliationOutcome> {
        match self.store.update_status(id, target).await {
            Ok(Transition::Applied { from, to }) => {
                info!(order_id = %id, %from, %to, %channel, "Order settled");
                Ok(ReconciliationOutcome::Applied(to))
            }
            Ok(Transition::Unchanged(status)) => {
                debug!(order_id = %id, %status, %channel, "Duplicate settlement ignored");
                Ok(ReconciliationOutcome::Duplicate(status))
            }
            Err(PaymentError::InvalidTransition { from, to }) => {
                warn!(order_id = %id, current = %from, attempted = %to, %channel, "Conflicting transition rejected");
                Ok(ReconciliationOutcome::Conflict {
                    current: from,
                    attempted: to,
                })
            }
            Err(err) => Err(err),
        }
    }
}
