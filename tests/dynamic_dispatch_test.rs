use payflow::domain::order::{Amount, Currency, Customer, Order, OrderId, OrderStatus, Provider};
use payflow::domain::payment::{Initiation, NextAction};
use payflow::domain::ports::{OrderStore, PaymentProvider, SharedOrderStore, SharedPaymentProvider};
use payflow::infrastructure::in_memory::InMemoryOrderStore;
use payflow::infrastructure::providers::CodAdapter;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_stores_and_providers_as_trait_objects() {
    let store: SharedOrderStore = Arc::new(InMemoryOrderStore::new());
    let provider: SharedPaymentProvider = Arc::new(CodAdapter);

    let order = Order::new(
        OrderId::parse("ord_1").unwrap(),
        Customer::default(),
        Amount::new(dec!(100.0)).unwrap(),
        Currency::parse("eur").unwrap(),
        Provider::Cod,
    );

    // Verify Send + Sync by spawning tasks
    let writer = store.clone();
    let handle = tokio::spawn(async move {
        writer.create(order.clone()).await.unwrap();
        let initiation = Initiation {
            reference: None,
            demo_token: None,
            next_action: NextAction::Message {
                message: String::new(),
            },
        };
        writer
            .record_initiation(&order.id, &initiation, Provider::Cod.pending_status())
            .await
            .unwrap()
    });
    let provider_handle = tokio::spawn(async move { provider.provider() });

    let placed = handle.await.unwrap();
    assert_eq!(placed.status, OrderStatus::CodPlaced);
    assert_eq!(provider_handle.await.unwrap(), Provider::Cod);

    let read = store.get(&placed.id).await.unwrap();
    assert_eq!(read, placed);
}
