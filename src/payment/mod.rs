//! Boundary to the external card processor.
//!
//! The backend only creates authorizations and looks them up. Card entry and
//! confirmation happen between the buyer's browser and the processor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod fake;
mod stripe;

pub use fake::FakeGateway;
pub use stripe::StripeGateway;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// The processor answered with an error of its own.
    #[error("{0}")]
    Processor(String),
    #[error("payment processor unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    pub client_secret: String,
    #[serde(rename = "paymentIntentId")]
    pub authorization_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentIntentStatus {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
}

impl PaymentIntentStatus {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// `amount` is in the smallest currency unit.
    async fn authorize(&self, amount: i64, currency: &str) -> Result<PaymentAuthorization, PaymentError>;

    async fn retrieve(&self, authorization_id: &str) -> Result<PaymentIntentStatus, PaymentError>;
}
