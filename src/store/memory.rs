//! Process-local stores backing tests and demos.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mongodb::bson::DateTime;
use tokio::sync::Mutex;

use super::{CatalogStore, OrderQuery, OrderStore};
use crate::error::StoreError;
use crate::models::{Order, OrderStatus, Product};

#[derive(Default)]
pub struct MemoryCatalog {
    products: Mutex<Vec<Product>>,
}

impl MemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        MemoryCatalog {
            products: Mutex::new(products),
        }
    }

    pub async fn stock_of(&self, id: &str) -> Option<u32> {
        self.products.lock().await.iter().find(|p| p.id == id).map(|p| p.stock)
    }

    pub async fn set_price(&self, id: &str, price: f64) {
        if let Some(product) = self.products.lock().await.iter_mut().find(|p| p.id == id) {
            product.price = price;
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_all(&self, keyword: Option<&str>) -> Result<Vec<Product>, StoreError> {
        let products = self.products.lock().await;
        let keyword = keyword.map(|k| k.trim().to_lowercase()).filter(|k| !k.is_empty());
        Ok(products
            .iter()
            .filter(|p| keyword.as_ref().map_or(true, |k| p.name.to_lowercase().contains(k)))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products.lock().await.iter().find(|p| p.id == id).cloned())
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .products
            .lock()
            .await
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn reserve_stock(&self, id: &str, qty: u32) -> Result<bool, StoreError> {
        let mut products = self.products.lock().await;
        match products.iter_mut().find(|p| p.id == id) {
            Some(product) if product.stock >= qty => {
                product.stock -= qty;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_stock(&self, id: &str, qty: u32) -> Result<(), StoreError> {
        if let Some(product) = self.products.lock().await.iter_mut().find(|p| p.id == id) {
            product.stock = product.stock.saturating_add(qty);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryOrders {
    orders: Mutex<Vec<Order>>,
    fail_creates: AtomicBool,
}

impl MemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `create` fail, as a lost database would.
    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.orders.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderStore for MemoryOrders {
    async fn create(&self, order: Order) -> Result<Order, StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("insert rejected".to_string()));
        }
        let mut orders = self.orders.lock().await;
        // Same constraint as the unique `payment.intentId` index.
        if let Some(payment) = &order.payment {
            if orders
                .iter()
                .any(|o| o.payment.as_ref().is_some_and(|p| p.intent_id == payment.intent_id))
            {
                return Err(StoreError::Duplicate(format!("payment.intentId {}", payment.intent_id)));
            }
        }
        orders.push(order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.lock().await.iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .lock()
            .await
            .iter()
            .find(|o| o.payment.as_ref().is_some_and(|p| p.intent_id == intent_id))
            .cloned())
    }

    async fn list(&self, query: &OrderQuery) -> Result<(Vec<Order>, u64), StoreError> {
        let orders = self.orders.lock().await;
        let mut matching: Vec<Order> = orders.iter().filter(|o| query.matches(o)).cloned().collect();
        matching.sort_by(|a, b| query.compare(a, b).then_with(|| a.id.cmp(&b.id)));
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.skip() as usize)
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn transition(
        &self,
        id: &str,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<Order>, StoreError> {
        let mut orders = self.orders.lock().await;
        let Some(order) = orders.iter_mut().find(|o| o.id == id && from.contains(&o.status)) else {
            return Ok(None);
        };
        order.status = to;
        if to == OrderStatus::Cancelled {
            order.cancelled_at = Some(DateTime::now());
        }
        Ok(Some(order.clone()))
    }
}
