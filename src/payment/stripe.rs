use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response};
use serde::Deserialize;

use super::{PaymentAuthorization, PaymentError, PaymentGateway, PaymentIntentStatus};

const DESCRIPTION: &str = "Payment for Polymart order";

/// Payment intents API over HTTPS.
pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct Intent {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
    amount: i64,
    currency: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        StripeGateway {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn read_intent(response: Response) -> Result<Intent, PaymentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<Intent>().await?);
        }
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message,
            Err(_) => None,
        };
        Err(PaymentError::Processor(
            message.unwrap_or_else(|| format!("processor returned {status}")),
        ))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn authorize(&self, amount: i64, currency: &str) -> Result<PaymentAuthorization, PaymentError> {
        debug!("Creating payment intent for {amount} {currency}");
        let amount = amount.to_string();
        let response = self
            .client
            .post(self.url("payment_intents"))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("payment_method_types[]", "card"),
                ("description", DESCRIPTION),
            ])
            .send()
            .await?;

        let intent = Self::read_intent(response).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::Processor("payment intent has no client secret".to_string()))?;
        Ok(PaymentAuthorization {
            client_secret,
            authorization_id: intent.id,
        })
    }

    async fn retrieve(&self, authorization_id: &str) -> Result<PaymentIntentStatus, PaymentError> {
        if authorization_id.is_empty() || !authorization_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PaymentError::Processor(format!(
                "No such payment_intent: '{authorization_id}'"
            )));
        }
        let response = self
            .client
            .get(self.url(&format!("payment_intents/{authorization_id}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let intent = Self::read_intent(response).await?;
        Ok(PaymentIntentStatus {
            id: intent.id,
            status: intent.status,
            amount: intent.amount,
            currency: intent.currency,
        })
    }
}
