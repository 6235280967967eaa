use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use mongodb::bson::{self, Bson};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProductImage {
    pub image: String,
}

/// Catalog entry. Products are created out-of-band; this service only reads
/// them and moves their stock.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id", deserialize_with = "object_id_hex")]
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "lenient::amount")]
    pub price: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub seller: String,
    #[serde(deserialize_with = "lenient::quantity")]
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default, deserialize_with = "lenient::amount_or_zero")]
    pub ratings: f64,
    #[serde(default, deserialize_with = "lenient::quantity_or_zero")]
    pub num_of_reviews: u32,
}

impl Product {
    pub fn first_image(&self) -> &str {
        self.images.first().map(|i| i.image.as_str()).unwrap_or("")
    }
}

// Product ids are ObjectIds in the database and hex strings everywhere else.
fn object_id_hex<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Bson::deserialize(deserializer)? {
        Bson::ObjectId(oid) => Ok(oid.to_hex()),
        Bson::String(s) => Ok(s),
        other => Err(D::Error::custom(format!("invalid product id: {other}"))),
    }
}

/// Older product documents carry numbers as text. Numeric text is accepted,
/// anything else is a decoding error rather than a silent zero.
pub mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Numeric {
        Int(i64),
        Float(f64),
        Text(String),
        Null,
    }

    fn to_amount<E: serde::de::Error>(value: Numeric, allow_null: bool) -> Result<f64, E> {
        let amount = match value {
            Numeric::Int(n) => n as f64,
            Numeric::Float(f) => f,
            Numeric::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("not a number: {s:?}")))?,
            Numeric::Null if allow_null => 0.0,
            Numeric::Null => return Err(E::custom("missing number")),
        };
        if !amount.is_finite() {
            return Err(E::custom("number must be finite"));
        }
        Ok(amount)
    }

    fn to_quantity<E: serde::de::Error>(value: Numeric, allow_null: bool) -> Result<u32, E> {
        match value {
            Numeric::Int(n) => u32::try_from(n).map_err(|_| E::custom(format!("invalid quantity: {n}"))),
            Numeric::Float(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as u32),
            Numeric::Float(f) => Err(E::custom(format!("invalid quantity: {f}"))),
            Numeric::Text(s) => s
                .trim()
                .parse::<u32>()
                .map_err(|_| E::custom(format!("not a quantity: {s:?}"))),
            Numeric::Null if allow_null => Ok(0),
            Numeric::Null => Err(E::custom("missing quantity")),
        }
    }

    pub fn amount<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        to_amount(Numeric::deserialize(d)?, false)
    }

    pub fn amount_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        to_amount(Numeric::deserialize(d)?, true)
    }

    pub fn quantity<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        to_quantity(Numeric::deserialize(d)?, false)
    }

    pub fn quantity_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        to_quantity(Numeric::deserialize(d)?, true)
    }

    /// Amounts in the smallest currency unit, e.g. cents.
    pub fn minor_units<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        match Numeric::deserialize(d)? {
            Numeric::Int(n) => Ok(n),
            Numeric::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
            Numeric::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| D::Error::custom(format!("amount must be a whole number: {s:?}"))),
            _ => Err(D::Error::custom("amount must be a whole number of minor units")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Statuses an order may be in for a move to `self` to be legal.
    pub fn reachable_from(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Processing => &[],
            OrderStatus::Shipped => &[OrderStatus::Processing],
            OrderStatus::Delivered => &[OrderStatus::Shipped],
            OrderStatus::Cancelled => &[OrderStatus::Processing],
        }
    }

    pub fn can_move_to(self, next: OrderStatus) -> bool {
        next.reachable_from().contains(&self)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(format!("unknown order status: {s}")),
        }
    }
}

/// Frozen copy of a product taken when the order was placed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderItem {
    pub product: String,
    pub name: String,
    pub qty: u32,
    pub price: f64,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRef {
    pub intent_id: String,
    pub status: String,
}

/// Order document as stored.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    pub items: Vec<OrderItem>,
    pub customer_info: CustomerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentRef>,
    pub subtotal: f64,
    pub shipping: f64,
    pub tax: f64,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: bson::DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<bson::DateTime>,
}

/// Order as returned over HTTP, with RFC 3339 timestamps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(rename = "_id")]
    pub id: String,
    pub items: Vec<OrderItem>,
    pub customer_info: CustomerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentRef>,
    pub subtotal: f64,
    pub shipping: f64,
    pub tax: f64,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

pub fn to_bson_datetime(at: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(at.timestamp_millis())
}

pub fn to_chrono(at: bson::DateTime) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(at.timestamp_millis())
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        OrderView {
            id: order.id,
            items: order.items,
            customer_info: order.customer_info,
            payment: order.payment,
            subtotal: order.subtotal,
            shipping: order.shipping,
            tax: order.tax,
            total: order.total,
            status: order.status,
            created_at: to_chrono(order.created_at),
            cancelled_at: order.cancelled_at.map(to_chrono),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockIssue {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<u32>,
    pub error: String,
}

impl StockIssue {
    pub fn not_found(product_id: impl Into<String>) -> Self {
        StockIssue {
            product_id: product_id.into(),
            name: None,
            available: None,
            requested: None,
            error: "Product not found".to_string(),
        }
    }

    pub fn insufficient(product: &Product, available: u32, requested: u32) -> Self {
        StockIssue {
            product_id: product.id.clone(),
            name: Some(product.name.clone()),
            available: Some(available),
            requested: Some(requested),
            error: "Insufficient stock".to_string(),
        }
    }
}

/// One line of a submitted cart. Accepts the flat `{productId, quantity}`
/// form and the nested `{product: {_id}, qty}` form browser carts send.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", from = "CartLineWire")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
struct ProductRef {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CartLineWire {
    Flat {
        #[serde(rename = "productId")]
        product_id: String,
        #[serde(alias = "qty")]
        quantity: u32,
    },
    Nested {
        product: ProductRef,
        #[serde(alias = "quantity")]
        qty: u32,
    },
}

impl From<CartLineWire> for CartLine {
    fn from(wire: CartLineWire) -> Self {
        match wire {
            CartLineWire::Flat { product_id, quantity } => CartLine { product_id, quantity },
            CartLineWire::Nested { product, qty } => CartLine {
                product_id: product.id,
                quantity: qty,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub country: String,
}

impl CustomerForm {
    /// Name of the first required field left blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("fullName", &self.full_name),
            ("email", &self.email),
            ("phone", &self.phone),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }

    pub fn into_customer_info(self) -> CustomerInfo {
        CustomerInfo {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address: self.address,
            city: self.city,
            zip_code: self.zip_code,
            country: self.country,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub cart_items: Vec<CartLine>,
    #[serde(default)]
    pub form_data: CustomerForm,
    pub subtotal: f64,
    pub shipping: f64,
    pub tax: f64,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentRequest {
    #[serde(deserialize_with = "lenient::minor_units")]
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProductSearch {
    pub keyword: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

/// `{ success, ...payload }` response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn ok(body: T) -> Self {
        Envelope { success: true, body }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductList {
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductDetail {
    pub product: Product,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub order: OrderView,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_pages: u64,
    pub current_page: u64,
    pub total_orders: u64,
    pub limit: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderPage {
    pub data: Vec<OrderView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stock_issues: Vec<StockIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_text_numbers_are_read_as_numbers() {
        let product: Product = serde_json::from_value(json!({
            "_id": "65f1c0ffee0000000000000a",
            "name": "Recycled PET chips",
            "price": "1000",
            "stock": "5",
            "ratings": "4.5",
            "numOfReviews": "12",
            "images": [{ "image": "/img/pet.jpg" }],
            "seller": "Green Loop"
        }))
        .unwrap();

        assert_eq!(product.price, 1000.0);
        assert_eq!(product.stock, 5);
        assert_eq!(product.ratings, 4.5);
        assert_eq!(product.num_of_reviews, 12);
        assert_eq!(product.first_image(), "/img/pet.jpg");
    }

    #[test]
    fn non_numeric_stock_is_rejected() {
        let result = serde_json::from_value::<Product>(json!({
            "_id": "65f1c0ffee0000000000000a",
            "name": "HDPE flakes",
            "price": 10,
            "stock": "plenty"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn negative_stock_is_rejected() {
        let result = serde_json::from_value::<Product>(json!({
            "_id": "a", "name": "x", "price": 1, "stock": -3
        }));
        assert!(result.is_err());
    }

    #[test]
    fn product_id_is_read_from_object_id() {
        let oid = bson::oid::ObjectId::new();
        let product: Product = bson::from_document(bson::doc! {
            "_id": oid,
            "name": "LDPE film",
            "price": 250.0,
            "stock": 7_i32,
        })
        .unwrap();
        assert_eq!(product.id, oid.to_hex());
        assert_eq!(product.stock, 7);
        assert_eq!(product.first_image(), "");
    }

    #[test]
    fn cart_lines_accept_both_shapes() {
        let flat: CartLine = serde_json::from_value(json!({ "productId": "p1", "quantity": 2 })).unwrap();
        let nested: CartLine =
            serde_json::from_value(json!({ "product": { "_id": "p1", "name": "x" }, "qty": 2 })).unwrap();
        assert_eq!(flat, nested);
        assert_eq!(
            serde_json::to_value(&flat).unwrap(),
            json!({ "productId": "p1", "quantity": 2 })
        );
    }

    #[test]
    fn missing_contact_field_is_reported() {
        let form = CustomerForm {
            full_name: "Nimal Perera".into(),
            email: "  ".into(),
            phone: "0771234567".into(),
            ..CustomerForm::default()
        };
        assert_eq!(form.missing_field(), Some("email"));
    }

    #[test]
    fn status_transitions() {
        use OrderStatus::*;
        assert!(Processing.can_move_to(Cancelled));
        assert!(Processing.can_move_to(Shipped));
        assert!(Shipped.can_move_to(Delivered));
        assert!(!Shipped.can_move_to(Cancelled));
        assert!(!Delivered.can_move_to(Shipped));
        assert!(!Cancelled.can_move_to(Processing));
        assert_eq!("canceled".parse::<OrderStatus>(), Ok(Cancelled));
    }

    #[test]
    fn payment_amount_accepts_whole_numbers_only() {
        let ok: PaymentRequest = serde_json::from_value(json!({ "amount": "315000" })).unwrap();
        assert_eq!(ok.amount, 315000);
        assert!(serde_json::from_value::<PaymentRequest>(json!({ "amount": 3150.5 })).is_err());
    }
}
