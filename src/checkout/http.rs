use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use super::{ApiError, StorefrontApi};
use crate::models::{
    Envelope, ErrorBody, ListOrdersParams, OrderOutcome, OrderPage, OrderView, PaymentRequest, PlaceOrderRequest,
    Product, ProductDetail, ProductList,
};
use crate::payment::PaymentAuthorization;

/// [`StorefrontApi`] over HTTP. `base_url` points at the `/api/v1` scope,
/// e.g. `http://127.0.0.1:8080/api/v1`.
pub struct HttpStorefront {
    client: Client,
    base_url: String,
}

impl HttpStorefront {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| Client::new());
        HttpStorefront {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let invalid = || ApiError::InvalidUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<Envelope<T>>().await?.body);
        }
        let body = match response.json::<ErrorBody>().await {
            Ok(body) => body,
            Err(_) => ErrorBody {
                error: status.canonical_reason().unwrap_or("Request failed").to_string(),
                message: None,
                stock_issues: Vec::new(),
            },
        };
        debug!("Storefront rejected request with {}: {}", status, body.error);
        Err(ApiError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl StorefrontApi for HttpStorefront {
    async fn products(&self, keyword: Option<&str>) -> Result<Vec<Product>, ApiError> {
        let mut request = self.client.get(self.url(&["products"])?);
        if let Some(keyword) = keyword {
            request = request.query(&[("keyword", keyword)]);
        }
        let list: ProductList = Self::read(request.send().await?).await?;
        Ok(list.products)
    }

    async fn product(&self, id: &str) -> Result<Product, ApiError> {
        let response = self.client.get(self.url(&["product", id])?).send().await?;
        let detail: ProductDetail = Self::read(response).await?;
        Ok(detail.product)
    }

    async fn authorize_payment(&self, amount: i64, currency: &str) -> Result<PaymentAuthorization, ApiError> {
        let body = PaymentRequest {
            amount,
            currency: Some(currency.to_string()),
        };
        let response = self.client.post(self.url(&["payment"])?).json(&body).send().await?;
        Self::read(response).await
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderView, ApiError> {
        let response = self.client.post(self.url(&["order"])?).json(request).send().await?;
        let outcome: OrderOutcome = Self::read(response).await?;
        Ok(outcome.order)
    }

    async fn orders(&self, params: &ListOrdersParams) -> Result<OrderPage, ApiError> {
        let response = self.client.get(self.url(&["order"])?).query(params).send().await?;
        Self::read(response).await
    }

    async fn cancel_order(&self, id: &str) -> Result<OrderView, ApiError> {
        let response = self.client.delete(self.url(&["order", id])?).send().await?;
        let outcome: OrderOutcome = Self::read(response).await?;
        Ok(outcome.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_join_base_url() {
        let api = HttpStorefront::new("http://127.0.0.1:8080/api/v1/");
        assert_eq!(api.url(&["products"]).unwrap().as_str(), "http://127.0.0.1:8080/api/v1/products");
        assert_eq!(
            api.url(&["order", "abc"]).unwrap().as_str(),
            "http://127.0.0.1:8080/api/v1/order/abc"
        );
    }

    #[test]
    fn ids_are_encoded_as_one_segment() {
        let api = HttpStorefront::new("http://127.0.0.1:8080/api/v1");
        let url = api.url(&["order", "a/b?c#d"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/api/v1/order/a%2Fb%3Fc%23d");
        assert_eq!(url.query(), None);
        assert_eq!(url.path_segments().unwrap().count(), 4);
    }

    #[tokio::test]
    async fn malformed_base_url_is_reported() {
        let api = HttpStorefront::new("not a url");
        let err = api.product("abc").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let api = HttpStorefront::new("http://127.0.0.1:9/api/v1");
        let err = api.products(None).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(err.status(), None);
    }
}
