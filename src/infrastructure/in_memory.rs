use crate::domain::order::{Order, OrderId, OrderStatus, Transition};
use crate::domain::payment::Initiation;
use crate::domain::ports::OrderStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A thread-safe in-memory order store.
///
/// The outer `RwLock` only guards membership; each order sits behind its own
/// `Mutex`, so transitions on one order never wait on another.
/// Ideal for testing and demos where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Arc<Mutex<Order>>>>>,
    references: Arc<RwLock<HashMap<String, OrderId>>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: &OrderId) -> Result<Arc<Mutex<Order>>> {
        let orders = self.orders.read().await;
        orders
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("order {id}")))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(PaymentError::DuplicateId(order.id.to_string()));
        }
        orders.insert(order.id.clone(), Arc::new(Mutex::new(order)));
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> Result<Order> {
        let entry = self.entry(id).await?;
        let order = entry.lock().await;
        Ok(order.clone())
    }

    async fn find_by_provider_reference(&self, reference: &str) -> Result<Order> {
        let id = self.references.read().await.get(reference).cloned();
        let id =
            id.ok_or_else(|| PaymentError::NotFound(format!("provider reference {reference}")))?;
        self.get(&id).await
    }

    async fn update_status(&self, id: &OrderId, next: OrderStatus) -> Result<Transition> {
        let entry = self.entry(id).await?;
        let mut order = entry.lock().await;
        order.apply(next)
    }

    async fn begin_initiation(&self, id: &OrderId) -> Result<Order> {
        let entry = self.entry(id).await?;
        let mut order = entry.lock().await;
        order.claim_initiation()?;
        Ok(order.clone())
    }

    async fn abandon_initiation(&self, id: &OrderId) -> Result<()> {
        let entry = self.entry(id).await?;
        entry.lock().await.release_initiation();
        Ok(())
    }

    async fn record_initiation(
        &self,
        id: &OrderId,
        initiation: &Initiation,
        next: OrderStatus,
    ) -> Result<Order> {
        let entry = self.entry(id).await?;
        let mut order = entry.lock().await;
        let mut bound = order.clone();
        bound.bind_initiation(initiation, next)?;

        let handles: Vec<&String> = initiation.handles().collect();
        if !handles.is_empty() {
            let mut references = self.references.write().await;
            if let Some(taken) = handles
                .iter()
                .find(|handle| references.get(**handle).is_some_and(|owner| owner != id))
            {
                return Err(PaymentError::DuplicateReference((*taken).clone()));
            }
            for handle in handles {
                references.insert(handle.clone(), id.clone());
            }
        }

        *order = bound;
        Ok(order.clone())
    }
}
