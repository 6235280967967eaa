use async_trait::async_trait;
use futures::stream::TryStreamExt;
use futures::try_join;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::{Collection, Database};

use super::{CatalogStore, OrderQuery, OrderStore};
use crate::db::{ORDERS, PRODUCTS};
use crate::error::StoreError;
use crate::models::{to_bson_datetime, Order, OrderStatus, Product};

pub struct MongoCatalog {
    products: Collection<Product>,
}

impl MongoCatalog {
    pub fn new(database: &Database) -> Self {
        MongoCatalog {
            products: database.collection(PRODUCTS),
        }
    }
}

/// Escapes regex metacharacters so a search keyword matches literally.
fn escape_regex(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CatalogStore for MongoCatalog {
    async fn find_all(&self, keyword: Option<&str>) -> Result<Vec<Product>, StoreError> {
        let filter = match keyword.map(str::trim).filter(|k| !k.is_empty()) {
            Some(keyword) => doc! { "name": { "$regex": escape_regex(keyword), "$options": "i" } },
            None => doc! {},
        };
        let cursor = self.products.find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(None);
        };
        Ok(self.products.find_one(doc! { "_id": oid }, None).await?)
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<Product>, StoreError> {
        let oids: Vec<ObjectId> = ids.iter().filter_map(|id| ObjectId::parse_str(id).ok()).collect();
        if oids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self.products.find(doc! { "_id": { "$in": oids } }, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn reserve_stock(&self, id: &str, qty: u32) -> Result<bool, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(false);
        };
        let qty = i64::from(qty);
        let result = self
            .products
            .update_one(
                doc! { "_id": oid, "stock": { "$gte": qty } },
                doc! { "$inc": { "stock": -qty } },
                None,
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn release_stock(&self, id: &str, qty: u32) -> Result<(), StoreError> {
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(());
        };
        self.products
            .update_one(doc! { "_id": oid }, doc! { "$inc": { "stock": i64::from(qty) } }, None)
            .await?;
        Ok(())
    }
}

pub struct MongoOrders {
    orders: Collection<Order>,
}

impl MongoOrders {
    pub fn new(database: &Database) -> Self {
        MongoOrders {
            orders: database.collection(ORDERS),
        }
    }
}

fn list_filter(query: &OrderQuery) -> Document {
    let mut filter = Document::new();
    match query.status {
        Some(status) => filter.insert("status", status.as_str()),
        None => filter.insert("status", doc! { "$ne": OrderStatus::Cancelled.as_str() }),
    };
    if let Some(email) = &query.customer_email {
        filter.insert("customerInfo.email", email.as_str());
    }
    if query.created_from.is_some() || query.created_to.is_some() {
        let mut range = Document::new();
        if let Some(from) = query.created_from {
            range.insert("$gte", to_bson_datetime(from));
        }
        if let Some(to) = query.created_to {
            range.insert("$lte", to_bson_datetime(to));
        }
        filter.insert("createdAt", range);
    }
    filter
}

fn list_sort(query: &OrderQuery) -> Document {
    let mut sort = Document::new();
    sort.insert(query.sort_by.path(), if query.descending { -1 } else { 1 });
    // Stable paging when the sort key ties.
    sort.insert("_id", 1);
    sort
}

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl OrderStore for MongoOrders {
    async fn create(&self, order: Order) -> Result<Order, StoreError> {
        match self.orders.insert_one(&order, None).await {
            Ok(_) => Ok(order),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .find_one(doc! { "payment.intentId": intent_id }, None)
            .await?)
    }

    async fn list(&self, query: &OrderQuery) -> Result<(Vec<Order>, u64), StoreError> {
        let filter = list_filter(query);
        let options = FindOptions::builder()
            .sort(list_sort(query))
            .skip(query.skip())
            .limit(query.limit as i64)
            .build();

        let page = async {
            let cursor = self.orders.find(filter.clone(), options).await?;
            cursor.try_collect::<Vec<Order>>().await
        };
        let count = self.orders.count_documents(filter.clone(), None);
        let (orders, total) = try_join!(page, count)?;
        Ok((orders, total))
    }

    async fn transition(
        &self,
        id: &str,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<Order>, StoreError> {
        let from: Vec<Bson> = from.iter().map(|s| Bson::from(s.as_str())).collect();
        let mut set = doc! { "status": to.as_str() };
        if to == OrderStatus::Cancelled {
            set.insert("cancelledAt", mongodb::bson::DateTime::now());
        }
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .orders
            .find_one_and_update(
                doc! { "_id": id, "status": { "$in": from } },
                doc! { "$set": set },
                options,
            )
            .await?)
    }
}
