use serde::{Deserialize, Serialize};

use crate::models::{CartLine, Product};
use crate::pricing::{Pricing, Quote};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: Product,
    pub quantity: u32,
}

/// Buyer's cart. Each product appears once, with a quantity between 1 and
/// the stock seen when it was added.
///
/// Serializes as its list of items so it can be kept on the buyer's device.
/// Restoring goes through [`Cart::add`], so a stale or edited snapshot comes
/// back within the same bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CartItem>", into = "Vec<CartItem>")]
pub struct Cart {
    items: Vec<CartItem>,
}

impl From<Vec<CartItem>> for Cart {
    fn from(items: Vec<CartItem>) -> Self {
        let mut cart = Cart::new();
        for item in items {
            cart.add(item.product, item.quantity);
        }
        cart
    }
}

impl From<Cart> for Vec<CartItem> {
    fn from(cart: Cart) -> Self {
        cart.items
    }
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn quantity_of(&self, product_id: &str) -> Option<u32> {
        self.position(product_id).map(|i| self.items[i].quantity)
    }

    /// Adds `quantity` units, merging with an existing line. Returns the
    /// resulting quantity, or `None` when nothing could be added.
    pub fn add(&mut self, product: Product, quantity: u32) -> Option<u32> {
        if quantity == 0 || product.stock == 0 {
            return None;
        }
        match self.position(&product.id) {
            Some(i) => {
                let item = &mut self.items[i];
                item.quantity = item.quantity.saturating_add(quantity).min(product.stock);
                item.product = product;
                Some(item.quantity)
            }
            None => {
                let quantity = quantity.min(product.stock);
                self.items.push(CartItem { product, quantity });
                Some(quantity)
            }
        }
    }

    pub fn increase(&mut self, product_id: &str) -> Option<u32> {
        let i = self.position(product_id)?;
        let item = &mut self.items[i];
        if item.quantity < item.product.stock {
            item.quantity += 1;
        }
        Some(item.quantity)
    }

    pub fn decrease(&mut self, product_id: &str) -> Option<u32> {
        let i = self.position(product_id)?;
        let item = &mut self.items[i];
        if item.quantity > 1 {
            item.quantity -= 1;
        }
        Some(item.quantity)
    }

    pub fn remove(&mut self, product_id: &str) -> Option<CartItem> {
        let i = self.position(product_id)?;
        Some(self.items.remove(i))
    }

    /// Drops every line whose product id is in `product_ids`.
    pub fn remove_products<S: AsRef<str>>(&mut self, product_ids: &[S]) {
        self.items
            .retain(|item| !product_ids.iter().any(|id| id.as_ref() == item.product.id));
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn quote(&self, pricing: &Pricing) -> Quote {
        pricing.quote_lines(self.items.iter().map(|i| (i.product.price, i.quantity)))
    }

    pub fn to_order_lines(&self) -> Vec<CartLine> {
        self.items
            .iter()
            .map(|i| CartLine {
                product_id: i.product.id.clone(),
                quantity: i.quantity,
            })
            .collect()
    }

    fn position(&self, product_id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.product.id == product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price: f64, stock: u32) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            price,
            description: None,
            category: "Machinery".to_string(),
            seller: String::new(),
            stock,
            images: Vec::new(),
            ratings: 0.0,
            num_of_reviews: 0,
        }
    }

    #[test]
    fn add_merges_and_caps_at_stock() {
        let mut cart = Cart::new();
        assert_eq!(cart.add(product("a", 1000.0, 5), 3), Some(3));
        assert_eq!(cart.add(product("a", 1000.0, 5), 4), Some(5));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.add(product("b", 10.0, 0), 1), None);
        assert_eq!(cart.add(product("b", 10.0, 3), 0), None);
        assert!(cart.quantity_of("b").is_none());
    }

    #[test]
    fn increase_and_decrease_stay_in_bounds() {
        let mut cart = Cart::new();
        cart.add(product("a", 1000.0, 2), 1);
        assert_eq!(cart.increase("a"), Some(2));
        assert_eq!(cart.increase("a"), Some(2));
        assert_eq!(cart.decrease("a"), Some(1));
        assert_eq!(cart.decrease("a"), Some(1));
        assert_eq!(cart.increase("missing"), None);
    }

    #[test]
    fn totals_follow_pricing_rules() {
        let mut cart = Cart::new();
        cart.add(product("a", 1000.0, 5), 3);
        let quote = cart.quote(&Pricing::default());
        assert_eq!(quote.subtotal, 3000.0);
        assert_eq!(quote.shipping, 0.0);
        assert_eq!(quote.tax, 150.0);
        assert_eq!(quote.total, 3150.0);

        cart.decrease("a");
        let quote = cart.quote(&Pricing::default());
        assert_eq!(quote.shipping, 250.0);
        assert_eq!(quote.total, 2000.0 + 250.0 + 100.0);
    }

    #[test]
    fn restored_snapshot_is_brought_back_in_bounds() {
        let snapshot = serde_json::json!([
            { "product": product("a", 1000.0, 2), "quantity": 9 },
            { "product": product("b", 50.0, 0), "quantity": 1 },
            { "product": product("a", 1000.0, 2), "quantity": 1 },
            { "product": product("c", 75.0, 4), "quantity": 0 }
        ]);
        let cart: Cart = serde_json::from_value(snapshot).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.quantity_of("a"), Some(2));

        let saved = serde_json::to_value(&cart).unwrap();
        assert_eq!(saved[0]["quantity"], 2);
        assert_eq!(saved[0]["product"]["_id"], "a");
    }

    #[test]
    fn remove_products_drops_listed_lines() {
        let mut cart = Cart::new();
        cart.add(product("a", 1.0, 5), 1);
        cart.add(product("b", 1.0, 5), 2);
        cart.add(product("c", 1.0, 5), 3);
        cart.remove_products(&["a", "c"]);
        assert_eq!(
            cart.to_order_lines(),
            vec![CartLine {
                product_id: "b".to_string(),
                quantity: 2
            }]
        );
        assert!(cart.remove("b").is_some());
        assert!(cart.is_empty());
    }
}
