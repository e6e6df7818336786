use crate::domain::order::{Amount, Currency, Customer, Order, OrderId, OrderStatus, Provider};
use crate::domain::payment::{InitiationRequest, NextAction};
use crate::domain::ports::SharedOrderStore;
use crate::error::{PaymentError, Result};
use crate::infrastructure::providers::ProviderRegistry;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

/// A storefront's request to pay for an order.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub currency: Option<String>,
    pub payment_method: String,
    pub order_id: Option<String>,
    pub customer: Customer,
}

/// What the caller needs to continue the payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentCreated {
    pub provider: Provider,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub next_action: NextAction,
}

/// Creates orders and starts their payment with the selected provider.
///
/// Each call creates at most one order and makes at most one outbound
/// provider call (none for cash on delivery).
#[derive(Clone)]
pub struct PaymentOrchestrator {
    store: SharedOrderStore,
    providers: ProviderRegistry,
    default_currency: Currency,
}

impl PaymentOrchestrator {
    pub fn new(
        store: SharedOrderStore,
        providers: ProviderRegistry,
        default_currency: Currency,
    ) -> Self {
        Self {
            store,
            providers,
            default_currency,
        }
    }

    pub async fn create_payment(&self, request: PaymentRequest) -> Result<PaymentCreated> {
        let amount = Amount::new(request.amount)?;
        let provider: Provider = request.payment_method.parse()?;
        let currency = match request.currency.as_deref() {
            Some(code) => Currency::parse(code)?,
            None => self.default_currency.clone(),
        };
        let adapter = self.providers.get(provider)?;
        let order_id = match request.order_id {
            Some(id) => OrderId::parse(id)?,
            None => OrderId::generate(),
        };

        let order = Order::new(order_id, request.customer, amount, currency, provider);
        let order = self.open(order).await?;
        // Only the holder of the reservation talks to the provider.
        let order = self.store.begin_initiation(&order.id).await?;

        let initiation_request = InitiationRequest {
            order_id: order.id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            customer: order.customer.clone(),
            attempt: order.initiation_attempts,
        };

        match adapter.initiate(&initiation_request).await {
            Ok(initiation) => {
                let recorded = self
                    .store
                    .record_initiation(&order.id, &initiation, provider.pending_status())
                    .await;
                let order = match recorded {
                    Ok(order) => order,
                    Err(err) => {
                        self.release(&order.id).await;
                        return Err(err);
                    }
                };
                info!(
                    order_id = %order.id,
                    %provider,
                    status = %order.status,
                    reference = order.provider_reference.as_deref().unwrap_or("-"),
                    "Payment initiated"
                );
                Ok(PaymentCreated {
                    provider,
                    order_id: order.id,
                    status: order.status,
                    next_action: initiation.next_action,
                })
            }
            Err(err) if err.is_retriable() => {
                warn!(
                    order_id = %order.id,
                    %provider,
                    attempt = order.initiation_attempts,
                    error = %err,
                    "Payment initiation failed"
                );
                self.release(&order.id).await;
                Err(err)
            }
            Err(err) => {
                error!(order_id = %order.id, %provider, error = %err, "Payment refused by provider");
                if let Err(mark_err) = self.store.update_status(&order.id, OrderStatus::Failed).await {
                    error!(order_id = %order.id, error = %mark_err, "Could not mark order failed");
                }
                self.release(&order.id).await;
                Err(err)
            }
        }
    }

    async fn release(&self, id: &OrderId) {
        if let Err(err) = self.store.abandon_initiation(id).await {
            error!(order_id = %id, error = %err, "Could not release initiation");
        }
    }

    /// Persists a new order, or picks up one a previous attempt left in `created`.
    ///
    /// Resuming requires the same provider and amount; anything else is a duplicate.
    async fn open(&self, order: Order) -> Result<Order> {
        match self.store.create(order.clone()).await {
            Ok(()) => Ok(order),
            Err(PaymentError::DuplicateId(id)) => {
                let existing = self.store.get(&order.id).await?;
                if existing.status == OrderStatus::Created
                    && existing.provider == order.provider
                    && existing.amount == order.amount
                {
                    info!(order_id = %existing.id, "Retrying initiation for existing order");
                    Ok(existing)
                } else {
                    Err(PaymentError::DuplicateId(id))
                }
            }
            Err(err) => Err(err),
        }
    }
}
