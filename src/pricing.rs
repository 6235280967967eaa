use serde::{Deserialize, Serialize};

/// Shipping and tax rules for a cart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    /// Subtotals strictly above this ship free.
    pub free_shipping_threshold: f64,
    pub flat_shipping_fee: f64,
    pub tax_rate: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Pricing {
            free_shipping_threshold: 2500.0,
            flat_shipping_fee: 250.0,
            tax_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub subtotal: f64,
    pub shipping: f64,
    pub tax: f64,
    pub total: f64,
}

impl Pricing {
    pub fn quote(&self, subtotal: f64) -> Quote {
        let shipping = if subtotal > self.free_shipping_threshold {
            0.0
        } else {
            self.flat_shipping_fee
        };
        let tax = subtotal * self.tax_rate;
        Quote {
            subtotal,
            shipping,
            tax,
            total: subtotal + shipping + tax,
        }
    }

    /// Quote for `(unit price, quantity)` pairs.
    pub fn quote_lines<I>(&self, lines: I) -> Quote
    where
        I: IntoIterator<Item = (f64, u32)>,
    {
        let subtotal = lines
            .into_iter()
            .map(|(price, qty)| price * f64::from(qty))
            .sum();
        self.quote(subtotal)
    }
}

impl Quote {
    /// True when every field agrees with `other` to the cent.
    pub fn agrees_with(&self, other: &Quote) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() < 0.005;
        close(self.subtotal, other.subtotal)
            && close(self.shipping, other.shipping)
            && close(self.tax, other.tax)
            && close(self.total, other.total)
    }
}

/// Converts a major-unit amount into the smallest currency unit.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}
