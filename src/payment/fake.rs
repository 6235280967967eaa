use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{PaymentAuthorization, PaymentError, PaymentGateway, PaymentIntentStatus};

/// In-process processor for tests and local runs. Intents start in
/// `requires_payment_method` and move to `succeeded` through [`FakeGateway::confirm`].
#[derive(Default)]
pub struct FakeGateway {
    intents: Mutex<HashMap<String, PaymentIntentStatus>>,
    next_id: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call fail with `message`.
    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().await = Some(message.into());
    }

    /// Confirms a card payment the way a buyer's browser would.
    pub async fn confirm(&self, client_secret: &str) -> Option<PaymentIntentStatus> {
        let id = client_secret.split("_secret_").next()?;
        let mut intents = self.intents.lock().await;
        let intent = intents.get_mut(id)?;
        intent.status = "succeeded".to_string();
        Some(intent.clone())
    }

    async fn check_failure(&self) -> Result<(), PaymentError> {
        match self.failure.lock().await.as_ref() {
            Some(message) => Err(PaymentError::Processor(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn authorize(&self, amount: i64, currency: &str) -> Result<PaymentAuthorization, PaymentError> {
        self.check_failure().await?;
        let id = format!("pi_fake_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let intent = PaymentIntentStatus {
            id: id.clone(),
            status: "requires_payment_method".to_string(),
            amount,
            currency: currency.to_string(),
        };
        self.intents.lock().await.insert(id.clone(), intent);
        Ok(PaymentAuthorization {
            client_secret: format!("{id}_secret_fake"),
            authorization_id: id,
        })
    }

    async fn retrieve(&self, authorization_id: &str) -> Result<PaymentIntentStatus, PaymentError> {
        self.check_failure().await?;
        self.intents
            .lock()
            .await
            .get(authorization_id)
            .cloned()
            .ok_or_else(|| PaymentError::Processor(format!("No such payment_intent: '{authorization_id}'")))
    }
}
