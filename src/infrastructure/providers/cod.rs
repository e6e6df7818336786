use crate::domain::order::Provider;
use crate::domain::payment::{Initiation, InitiationRequest, NextAction};
use crate::domain::ports::PaymentProvider;
use crate::error::Result;
use async_trait::async_trait;

pub const COD_MESSAGE: &str = "Order placed. Pay on delivery.";

/// Cash on delivery: nothing to call, the order is placed unpaid.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodAdapter;

#[async_trait]
impl PaymentProvider for CodAdapter {
    fn provider(&self) -> Provider {
        Provider::Cod
    }

    async fn initiate(&self, _request: &InitiationRequest) -> Result<Initiation> {
        Ok(Initiation {
            reference: None,
            demo_token: None,
            next_action: NextAction::Message {
                message: COD_MESSAGE.to_string(),
            },
        })
    }
}
