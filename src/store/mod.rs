use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Order, OrderStatus, Product};

pub mod memory;
pub mod mongo;
mod query;

pub use query::{OrderQuery, SortField};

#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    /// Case-insensitive substring match on the product name, or everything.
    async fn find_all(&self, keyword: Option<&str>) -> Result<Vec<Product>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StoreError>;

    /// Products for every id that exists; unknown ids are skipped.
    async fn find_many(&self, ids: &[String]) -> Result<Vec<Product>, StoreError>;

    /// Takes `qty` units out of stock only if that many are available.
    async fn reserve_stock(&self, id: &str, qty: u32) -> Result<bool, StoreError>;

    /// Puts `qty` units back.
    async fn release_stock(&self, id: &str, qty: u32) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    async fn create(&self, order: Order) -> Result<Order, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, StoreError>;

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, StoreError>;

    /// One page of matching orders and the total number of matches.
    async fn list(&self, query: &OrderQuery) -> Result<(Vec<Order>, u64), StoreError>;

    /// Moves the order to `to` if it is currently in one of `from`. Returns
    /// the updated order, or `None` when no order matched.
    async fn transition(
        &self,
        id: &str,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<Order>, StoreError>;
}
