//! Order placement.
//!
//! A submitted cart goes through four gates before an order exists:
//!
//! 1. request validation (non-empty cart, positive quantities, contact
//!    fields, sane money fields),
//! 2. a read-only stock check against a single batch read of the catalog,
//!    which reports every offending line at once,
//! 3. payment verification against the processor, when a payment intent is
//!    referenced or required,
//! 4. stock reservation, one compare-and-decrement per line.
//!
//! Nothing is written until gate 4. If any reservation loses a race, the
//! reservations already taken are released and the order is rejected with
//! the lines that lost. If the order insert fails afterwards, every
//! reservation is released again.

use std::collections::HashMap;

use chrono::Utc;
use log::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, StoreError};
use crate::models::{
    to_bson_datetime, CartLine, Order, OrderItem, OrderStatus, PaymentRef, PlaceOrderRequest, Product, StockIssue,
};
use crate::payment::PaymentGateway;
use crate::pricing::{to_minor_units, Pricing, Quote};
use crate::store::{CatalogStore, OrderStore};

#[derive(Debug, Clone)]
pub struct PlacementPolicy {
    /// Refuse orders that do not reference a payment intent.
    pub require_payment: bool,
    pub currency: String,
    pub pricing: Pricing,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        PlacementPolicy {
            require_payment: true,
            currency: "lkr".to_string(),
            pricing: Pricing::default(),
        }
    }
}

pub struct OrderPlacement<'a> {
    catalog: &'a dyn CatalogStore,
    orders: &'a dyn OrderStore,
    payments: &'a dyn PaymentGateway,
    policy: &'a PlacementPolicy,
}

impl<'a> OrderPlacement<'a> {
    pub fn new(
        catalog: &'a dyn CatalogStore,
        orders: &'a dyn OrderStore,
        payments: &'a dyn PaymentGateway,
        policy: &'a PlacementPolicy,
    ) -> Self {
        OrderPlacement {
            catalog,
            orders,
            payments,
            policy,
        }
    }

    pub async fn place(&self, request: PlaceOrderRequest) -> Result<Order, AppError> {
        validate(&request)?;

        let ids: Vec<String> = request.cart_items.iter().map(|l| l.product_id.clone()).collect();
        let products = self.catalog.find_many(&ids).await?;
        let items = classify(&request.cart_items, &products).map_err(|issues| {
            warn!("Order rejected with {} stock issue(s)", issues.len());
            AppError::StockConflict(issues)
        })?;

        let quote = self
            .policy
            .pricing
            .quote_lines(items.iter().map(|item| (item.price, item.qty)));
        let supplied = Quote {
            subtotal: request.subtotal,
            shipping: request.shipping,
            tax: request.tax,
            total: request.total,
        };
        if !quote.agrees_with(&supplied) {
            warn!(
                "Supplied totals {:?} differ from catalog quote {:?}; storing supplied totals",
                supplied, quote
            );
        }

        let payment = self.verify_payment(&request).await?;

        self.reserve(&items).await?;

        let order = Order {
            id: Uuid::new_v4().to_string(),
            items,
            customer_info: request.form_data.into_customer_info(),
            payment,
            subtotal: request.subtotal,
            shipping: request.shipping,
            tax: request.tax,
            total: request.total,
            status: OrderStatus::Processing,
            created_at: to_bson_datetime(Utc::now()),
            cancelled_at: None,
        };

        let reserved = order.items.clone();
        match self.orders.create(order).await {
            Ok(order) => {
                info!("Order {} placed with {} line(s), total {}", order.id, order.items.len(), order.total);
                Ok(order)
            }
            Err(StoreError::Duplicate(detail)) => {
                warn!("Payment already recorded by a concurrent order ({}), releasing reserved stock", detail);
                self.release(&reserved).await;
                Err(AppError::Payment("Payment has already been used for another order".to_string()))
            }
            Err(e) => {
                error!("Order insert failed, releasing reserved stock: {}", e);
                self.release(&reserved).await;
                Err(e.into())
            }
        }
    }

    async fn verify_payment(&self, request: &PlaceOrderRequest) -> Result<Option<PaymentRef>, AppError> {
        let intent_id = match request.payment_intent_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ if self.policy.require_payment => {
                return Err(AppError::Validation("Missing required field paymentIntentId".to_string()));
            }
            _ => return Ok(None),
        };

        if self.orders.find_by_payment_intent(intent_id).await?.is_some() {
            return Err(AppError::Payment(format!("Payment {intent_id} already used for another order")));
        }

        let intent = self.payments.retrieve(intent_id).await.map_err(|e| {
            warn!("Payment lookup for {} failed: {}", intent_id, e);
            AppError::Payment(format!("Payment {intent_id} could not be verified"))
        })?;
        if !intent.succeeded() {
            return Err(AppError::Payment(format!(
                "Payment {intent_id} has not succeeded (status {})",
                intent.status
            )));
        }
        let expected = to_minor_units(request.total);
        if intent.amount != expected || !intent.currency.eq_ignore_ascii_case(&self.policy.currency) {
            return Err(AppError::Payment(format!(
                "Payment {intent_id} covers {} {}, order needs {} {}",
                intent.amount, intent.currency, expected, self.policy.currency
            )));
        }

        Ok(Some(PaymentRef {
            intent_id: intent.id,
            status: intent.status,
        }))
    }

    /// Reserves every line or none.
    async fn reserve(&self, items: &[OrderItem]) -> Result<(), AppError> {
        let mut reserved: Vec<OrderItem> = Vec::with_capacity(items.len());
        let mut lost: Vec<OrderItem> = Vec::new();
        let mut failure = None;

        for item in items {
            match self.catalog.reserve_stock(&item.product, item.qty).await {
                Ok(true) => reserved.push(item.clone()),
                Ok(false) => lost.push(item.clone()),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if lost.is_empty() && failure.is_none() {
            return Ok(());
        }

        self.release(&reserved).await;

        if let Some(e) = failure {
            return Err(e.into());
        }

        let mut issues = Vec::with_capacity(lost.len());
        for item in &lost {
            let issue = match self.catalog.find_by_id(&item.product).await? {
                Some(product) => StockIssue::insufficient(&product, product.stock, item.qty),
                None => StockIssue::not_found(item.product.clone()),
            };
            issues.push(issue);
        }
        warn!("Stock changed during placement, {} line(s) lost the race", issues.len());
        Err(AppError::StockConflict(issues))
    }

    async fn release(&self, items: &[OrderItem]) {
        for item in items {
            if let Err(e) = self.catalog.release_stock(&item.product, item.qty).await {
                error!("Failed to release {} unit(s) of {}: {}", item.qty, item.product, e);
            }
        }
    }
}

fn validate(request: &PlaceOrderRequest) -> Result<(), AppError> {
    if request.cart_items.is_empty() {
        return Err(AppError::Validation("Cart items must be a non-empty array".to_string()));
    }
    if let Some(line) = request
        .cart_items
        .iter()
        .find(|l| l.quantity == 0 || l.product_id.trim().is_empty())
    {
        return Err(AppError::Validation(format!(
            "Invalid cart line for product {:?}: quantity must be at least 1",
            line.product_id
        )));
    }
    if let Some(field) = request.form_data.missing_field() {
        return Err(AppError::Validation(format!(
            "Missing required fields (fullName, email, phone): {field}"
        )));
    }
    let money = [request.subtotal, request.shipping, request.tax, request.total];
    if money.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(AppError::Validation(
            "subtotal, shipping, tax and total must be non-negative numbers".to_string(),
        ));
    }
    Ok(())
}

/// Splits cart lines into frozen order items, or every stock issue found.
/// Lines naming the same product draw on one shared stock count.
pub fn classify(lines: &[CartLine], products: &[Product]) -> Result<Vec<OrderItem>, Vec<StockIssue>> {
    let by_id: HashMap<&str, &Product> = products.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut remaining: HashMap<&str, u32> = products.iter().map(|p| (p.id.as_str(), p.stock)).collect();
    let mut items = Vec::with_capacity(lines.len());
    let mut issues = Vec::new();

    for line in lines {
        let Some(product) = by_id.get(line.product_id.as_str()) else {
            issues.push(StockIssue::not_found(line.product_id.clone()));
            continue;
        };
        let left = remaining.entry(product.id.as_str()).or_insert(product.stock);
        if line.quantity > *left {
            issues.push(StockIssue::insufficient(product, *left, line.quantity));
            continue;
        }
        *left -= line.quantity;
        items.push(OrderItem {
            product: product.id.clone(),
            name: product.name.clone(),
            qty: line.quantity,
            price: product.price,
            image: product.first_image().to_string(),
        });
    }

    if issues.is_empty() {
        Ok(items)
    } else {
        Err(issues)
    }
}
