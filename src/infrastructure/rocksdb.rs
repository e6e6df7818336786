use crate::domain::order::{Order, OrderId, OrderStatus, Transition};
use crate::domain::payment::Initiation;
use crate::domain::ports::OrderStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Column Family for storing orders, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family mapping provider references to order ids.
pub const CF_REFERENCES: &str = "references";

const LOCK_STRIPES: usize = 64;

/// A persistent order store implementation using RocksDB.
///
/// Orders are JSON-encoded in their own Column Family; the reference index
/// lives in a second one and is written in the same batch as the order it
/// points to. Read-modify-write cycles are serialized per order id through a
/// fixed set of lock stripes, so unrelated orders rarely contend.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    locks: Arc<[Mutex<()>; LOCK_STRIPES]>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("orders" and "references") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());
        let cf_references = ColumnFamilyDescriptor::new(CF_REFERENCES, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_orders, cf_references])?;

        Ok(Self {
            db: Arc::new(db),
            locks: Arc::new(std::array::from_fn(|_| Mutex::new(()))),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::Storage(format!("{name} column family not found")))
    }

    fn stripe(key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % LOCK_STRIPES
    }

    async fn lock(&self, id: &OrderId) -> MutexGuard<'_, ()> {
        self.locks[Self::stripe(id.as_str())].lock().await
    }

    /// Locks the stripes of every key, always in ascending stripe order.
    async fn lock_all<'a>(&self, keys: impl Iterator<Item = &'a str>) -> Vec<MutexGuard<'_, ()>> {
        let mut stripes: Vec<usize> = keys.map(Self::stripe).collect();
        stripes.sort_unstable();
        stripes.dedup();

        let mut guards = Vec::with_capacity(stripes.len());
        for stripe in stripes {
            guards.push(self.locks[stripe].lock().await);
        }
        guards
    }

    fn read(&self, id: &OrderId) -> Result<Option<Order>> {
        let bytes = self.db.get_cf(self.cf(CF_ORDERS)?, id.as_str().as_bytes())?;
        bytes
            .map(|bytes| {
                serde_json::from_slice(&bytes)
                    .map_err(|e| PaymentError::storage(format!("Deserialization error: {e}")))
            })
            .transpose()
    }

    fn encode(order: &Order) -> Result<Vec<u8>> {
        serde_json::to_vec(order)
            .map_err(|e| PaymentError::storage(format!("Serialization error: {e}")))
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn create(&self, order: Order) -> Result<()> {
        let _guard = self.lock(&order.id).await;
        if self.read(&order.id)?.is_some() {
            return Err(PaymentError::DuplicateId(order.id.to_string()));
        }
        self.db.put_cf(
            self.cf(CF_ORDERS)?,
            order.id.as_str().as_bytes(),
            Self::encode(&order)?,
        )?;
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> Result<Order> {
        self.read(id)?
            .ok_or_else(|| PaymentError::NotFound(format!("order {id}")))
    }

    async fn find_by_provider_reference(&self, reference: &str) -> Result<Order> {
        let id = self
            .db
            .get_cf(self.cf(CF_REFERENCES)?, reference.as_bytes())?
            .ok_or_else(|| PaymentError::NotFound(format!("provider reference {reference}")))?;
        let id = String::from_utf8(id)
            .map_err(|e| PaymentError::storage(format!("Corrupt reference index: {e}")))?;
        self.get(&OrderId::parse(id)?).await
    }

    async fn update_status(&self, id: &OrderId, next: OrderStatus) -> Result<Transition> {
        let _guard = self.lock(id).await;
        let mut order = self.get(id).await?;
        let transition = order.apply(next)?;
        if let Transition::Applied { .. } = transition {
            self.db
                .put_cf(self.cf(CF_ORDERS)?, id.as_str().as_bytes(), Self::encode(&order)?)?;
        }
        Ok(transition)
    }

    async fn begin_initiation(&self, id: &OrderId) -> Result<Order> {
        let _guard = self.lock(id).await;
        let mut order = self.get(id).await?;
        order.claim_initiation()?;
        self.db
            .put_cf(self.cf(CF_ORDERS)?, id.as_str().as_bytes(), Self::encode(&order)?)?;
        Ok(order)
    }

    async fn abandon_initiation(&self, id: &OrderId) -> Result<()> {
        let _guard = self.lock(id).await;
        let mut order = self.get(id).await?;
        order.release_initiation();
        self.db
            .put_cf(self.cf(CF_ORDERS)?, id.as_str().as_bytes(), Self::encode(&order)?)?;
        Ok(())
    }

    async fn record_initiation(
        &self,
        id: &OrderId,
        initiation: &Initiation,
        next: OrderStatus,
    ) -> Result<Order> {
        let keys = std::iter::once(id.as_str()).chain(initiation.handles().map(String::as_str));
        let _guards = self.lock_all(keys).await;
        let mut order = self.get(id).await?;
        order.bind_initiation(initiation, next)?;

        let mut batch = WriteBatch::default();
        let references = self.cf(CF_REFERENCES)?;
        for handle in initiation.handles() {
            if let Some(owner) = self.db.get_cf(references, handle.as_bytes())?
                && owner != id.as_str().as_bytes()
            {
                return Err(PaymentError::DuplicateReference(handle.clone()));
            }
            batch.put_cf(references, handle.as_bytes(), id.as_str().as_bytes());
        }

        batch.put_cf(self.cf(CF_ORDERS)?, id.as_str().as_bytes(), Self::encode(&order)?);
        self.db.write(batch)?;

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Amount, Currency, Customer, Provider};
    use crate::domain::payment::NextAction;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn order(id: &str) -> Order {
        Order::new(
            OrderId::parse(id).unwrap(),
            Customer::default(),
            Amount::new(dec!(120.50)).unwrap(),
            Currency::parse("eur").unwrap(),
            Provider::Stripe,
        )
    }

    fn initiation(reference: &str) -> Initiation {
        Initiation {
            reference: Some(reference.to_string()),
            demo_token: None,
            next_action: NextAction::Message {
                message: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_ORDERS).is_some());
        assert!(store.db.cf_handle(CF_REFERENCES).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_order_lifecycle() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let order = order("ord_1");

        store.create(order.clone()).await.unwrap();
        assert!(matches!(
            store.create(order.clone()).await,
            Err(PaymentError::DuplicateId(_))
        ));

        store
            .record_initiation(&order.id, &initiation("pi_1"), OrderStatus::PendingCard)
            .await
            .unwrap();
        let transition = store.update_status(&order.id, OrderStatus::Paid).await.unwrap();
        assert!(matches!(transition, Transition::Applied { .. }));
        assert_eq!(
            store.update_status(&order.id, OrderStatus::Paid).await.unwrap(),
            Transition::Unchanged(OrderStatus::Paid)
        );

        let found = store.find_by_provider_reference("pi_1").await.unwrap();
        assert_eq!(found.status, OrderStatus::Paid);
        assert!(store.find_by_provider_reference("pi_2").await.is_err());
    }

    #[tokio::test]
    async fn test_rocksdb_concurrent_binds_of_one_reference() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let ids: Vec<OrderId> = (0..16)
            .map(|i| OrderId::parse(format!("ord_{i}")).unwrap())
            .collect();
        for id in &ids {
            store.create(order(id.as_str())).await.unwrap();
        }

        let mut handles = Vec::new();
        for id in ids.clone() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record_initiation(&id, &initiation("pi_shared"), OrderStatus::PendingCard)
                    .await
            }));
        }

        let mut bound = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => bound += 1,
                Err(PaymentError::DuplicateReference(_)) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(bound, 1);

        let owner = store.find_by_provider_reference("pi_shared").await.unwrap();
        assert_eq!(owner.status, OrderStatus::PendingCard);
        for id in ids.iter().filter(|id| **id != owner.id) {
            assert_eq!(store.get(id).await.unwrap().status, OrderStatus::Created);
        }
    }

    #[tokio::test]
    async fn test_rocksdb_initiation_claim_persists() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let order = order("ord_1");
        store.create(order.clone()).await.unwrap();

        store.begin_initiation(&order.id).await.unwrap();
        assert!(matches!(
            store.begin_initiation(&order.id).await,
            Err(PaymentError::InitiationInProgress(_))
        ));
        store.abandon_initiation(&order.id).await.unwrap();
        assert_eq!(store.begin_initiation(&order.id).await.unwrap().initiation_attempts, 2);

        store
            .record_initiation(&order.id, &initiation("pi_1"), OrderStatus::PendingCard)
            .await
            .unwrap();
        assert!(matches!(
            store
                .record_initiation(&order.id, &initiation("pi_2"), OrderStatus::PendingCard)
                .await,
            Err(PaymentError::InvalidTransition { .. })
        ));
        assert!(store.find_by_provider_reference("pi_2").await.is_err());
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        let order = order("ord_1");
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.create(order.clone()).await.unwrap();
            store
                .record_initiation(&order.id, &initiation("pi_7"), OrderStatus::PendingCard)
                .await
                .unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let found = store.find_by_provider_reference("pi_7").await.unwrap();
        assert_eq!(found.id, order.id);
        assert_eq!(found.status, OrderStatus::PendingCard);
    }
}
