use super::order::{Order, OrderId, OrderStatus, Provider, Transition};
use super::payment::{Initiation, InitiationRequest, ProviderStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable mapping from order id to `Order`, the single source of truth for lifecycle state.
///
/// Every operation is atomic for the order it touches. Transitions on the same
/// id are serialized; different ids never contend.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order. Fails with `DuplicateId` if the id is taken.
    async fn create(&self, order: Order) -> Result<()>;

    async fn get(&self, id: &OrderId) -> Result<Order>;

    async fn find_by_provider_reference(&self, reference: &str) -> Result<Order>;

    /// Applies `next` under the order's lock. An invalid transition leaves the record unchanged.
    async fn update_status(&self, id: &OrderId, next: OrderStatus) -> Result<Transition>;

    /// Reserves a `created` order for one provider call and returns it with
    /// the attempt counter bumped. A concurrent reservation fails with
    /// `InitiationInProgress`; an order past `created` fails with `DuplicateId`.
    async fn begin_initiation(&self, id: &OrderId) -> Result<Order>;

    /// Drops the reservation after a provider call that left the order `created`.
    async fn abandon_initiation(&self, id: &OrderId) -> Result<()>;

    /// Binds the provider reference (and demo token) and moves a `created`
    /// order into `next` in one step. Any other starting state is refused and
    /// no handle is indexed.
    async fn record_initiation(
        &self,
        id: &OrderId,
        initiation: &Initiation,
        next: OrderStatus,
    ) -> Result<Order>;
}

/// One payment method behind a uniform capability.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn provider(&self) -> Provider;

    async fn initiate(&self, request: &InitiationRequest) -> Result<Initiation>;

    /// Live status lookup by provider reference, for providers that offer one.
    async fn verify(&self, _reference: &str) -> Result<ProviderStatus> {
        Err(PaymentError::VerificationUnsupported(self.provider()))
    }
}

pub type SharedOrderStore = Arc<dyn OrderStore>;
pub type SharedPaymentProvider = Arc<dyn PaymentProvider>;
