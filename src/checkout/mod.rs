//! Buyer-side cart and checkout.
//!
//! A [`CheckoutFlow`] owns the cart and walks `Cart -> Checkout -> Complete`.
//! Placing an order asks the backend for a payment authorization, has the
//! buyer confirm it through a [`CardConfirmer`], then submits the order with
//! the confirmed payment reference.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use thiserror::Error;

use crate::models::{
    CustomerForm, ErrorBody, ListOrdersParams, OrderPage, OrderView, Pagination, PlaceOrderRequest, Product,
    StockIssue,
};
use crate::payment::{PaymentAuthorization, PaymentError, PaymentIntentStatus};
use crate::pricing::{to_minor_units, Pricing, Quote};

mod cart;
mod http;

pub use cart::{Cart, CartItem};
pub use http::HttpStorefront;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a failure envelope.
    #[error("request rejected ({status}): {}", .body.error)]
    Rejected { status: u16, body: ErrorBody },
    #[error("storefront unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid storefront url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::InvalidUrl(_) => None,
        }
    }
}

/// Backend endpoints the buyer-side code talks to.
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    async fn products(&self, keyword: Option<&str>) -> Result<Vec<Product>, ApiError>;
    async fn product(&self, id: &str) -> Result<Product, ApiError>;
    async fn authorize_payment(&self, amount: i64, currency: &str) -> Result<PaymentAuthorization, ApiError>;
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderView, ApiError>;
    async fn orders(&self, params: &ListOrdersParams) -> Result<OrderPage, ApiError>;
    async fn cancel_order(&self, id: &str) -> Result<OrderView, ApiError>;
}

/// Card entry and confirmation against the payment processor.
#[async_trait]
pub trait CardConfirmer: Send + Sync {
    async fn confirm(&self, authorization: &PaymentAuthorization) -> Result<PaymentIntentStatus, PaymentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStep {
    Cart,
    Checkout,
    Complete,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),
    #[error("cannot {action} from the {step:?} step")]
    WrongStep { step: CheckoutStep, action: &'static str },
    #[error("Some items are no longer available")]
    StockConflict(Vec<StockIssue>),
    #[error("Payment failed: {0}")]
    Payment(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct CheckoutFlow {
    api: Arc<dyn StorefrontApi>,
    confirmer: Arc<dyn CardConfirmer>,
    pricing: Pricing,
    currency: String,
    cart: Cart,
    step: CheckoutStep,
    placed: Option<OrderView>,
}

impl CheckoutFlow {
    pub fn new(
        api: Arc<dyn StorefrontApi>,
        confirmer: Arc<dyn CardConfirmer>,
        pricing: Pricing,
        currency: impl Into<String>,
    ) -> Self {
        CheckoutFlow {
            api,
            confirmer,
            pricing,
            currency: currency.into(),
            cart: Cart::new(),
            step: CheckoutStep::Cart,
            placed: None,
        }
    }

    pub fn step(&self) -> CheckoutStep {
        self.step
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    /// The cart can only be edited on the cart step.
    pub fn cart_mut(&mut self) -> Result<&mut Cart, CheckoutError> {
        self.expect_step(CheckoutStep::Cart, "edit the cart")?;
        Ok(&mut self.cart)
    }

    pub fn totals(&self) -> Quote {
        self.cart.quote(&self.pricing)
    }

    /// Order placed by this flow, once complete.
    pub fn placed_order(&self) -> Option<&OrderView> {
        self.placed.as_ref()
    }

    pub fn proceed_to_checkout(&mut self) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::Cart, "proceed to checkout")?;
        if self.cart.is_empty() {
            return Err(CheckoutError::Validation("Your cart is empty".to_string()));
        }
        self.step = CheckoutStep::Checkout;
        Ok(())
    }

    pub fn back_to_cart(&mut self) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::Checkout, "go back to the cart")?;
        self.step = CheckoutStep::Cart;
        Ok(())
    }

    pub async fn place_order(&mut self, form: CustomerForm) -> Result<&OrderView, CheckoutError> {
        self.expect_step(CheckoutStep::Checkout, "place an order")?;
        if let Some(field) = form.missing_field() {
            return Err(CheckoutError::Validation(format!("{field} is required")));
        }

        let quote = self.totals();
        let authorization = self
            .api
            .authorize_payment(to_minor_units(quote.total), &self.currency)
            .await?;
        let intent = self
            .confirmer
            .confirm(&authorization)
            .await
            .map_err(|e| CheckoutError::Payment(e.to_string()))?;
        if !intent.succeeded() {
            return Err(CheckoutError::Payment(format!("payment is {}", intent.status)));
        }

        let request = PlaceOrderRequest {
            cart_items: self.cart.to_order_lines(),
            form_data: form,
            subtotal: quote.subtotal,
            shipping: quote.shipping,
            tax: quote.tax,
            total: quote.total,
            payment_intent_id: Some(authorization.authorization_id),
        };
        match self.api.place_order(&request).await {
            Ok(order) => {
                info!("Order {} placed", order.id);
                self.cart.clear();
                self.step = CheckoutStep::Complete;
                Ok(&*self.placed.insert(order))
            }
            Err(ApiError::Rejected { body, .. }) if !body.stock_issues.is_empty() => {
                let ids: Vec<&str> = body.stock_issues.iter().map(|i| i.product_id.as_str()).collect();
                warn!("Removing {} unavailable product(s) from the cart", ids.len());
                self.cart.remove_products(&ids);
                if self.cart.is_empty() {
                    self.step = CheckoutStep::Cart;
                }
                Err(CheckoutError::StockConflict(body.stock_issues))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn expect_step(&self, expected: CheckoutStep, action: &'static str) -> Result<(), CheckoutError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(CheckoutError::WrongStep { step: self.step, action })
        }
    }
}

/// The buyer's view of placed orders.
pub struct OrderHistory {
    api: Arc<dyn StorefrontApi>,
    orders: Vec<OrderView>,
    pagination: Option<Pagination>,
}

impl OrderHistory {
    pub fn new(api: Arc<dyn StorefrontApi>) -> Self {
        OrderHistory {
            api,
            orders: Vec::new(),
            pagination: None,
        }
    }

    pub fn orders(&self) -> &[OrderView] {
        &self.orders
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    pub async fn load(&mut self, params: &ListOrdersParams) -> Result<&[OrderView], ApiError> {
        let page = self.api.orders(params).await?;
        self.orders = page.data;
        self.pagination = Some(page.pagination);
        Ok(&self.orders)
    }

    /// Cancels on the backend, then drops the order from the loaded page.
    pub async fn cancel(&mut self, id: &str) -> Result<OrderView, ApiError> {
        let cancelled = self.api.cancel_order(id).await?;
        let before = self.orders.len();
        self.orders.retain(|o| o.id != id);
        if let Some(pagination) = self.pagination.as_mut() {
            if self.orders.len() < before {
                pagination.total_orders = pagination.total_orders.saturating_sub(1);
            }
        }
        Ok(cancelled)
    }
}
