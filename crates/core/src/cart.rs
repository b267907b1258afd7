//! The visitor's cart.
//!
//! [`Cart`] is the plain data structure plus its merge rules. Persisting it
//! between requests is the storefront's job (see its `CartStore`); nothing in
//! here performs I/O or can fail.

use serde::{Deserialize, Serialize};

use crate::product::Product;
use crate::types::{ProductId, Yen};

/// One product entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Yen,
    /// Always at least 1 while the line is in a cart.
    pub quantity: u32,
    /// Image shown next to the line; empty when the product has none.
    #[serde(default)]
    pub image: String,
}

impl CartLine {
    /// Build a line for `product` with the given quantity, snapshotting its
    /// current name, price and first image.
    #[must_use]
    pub fn for_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.price,
            quantity,
            image: product.primary_image().unwrap_or_default().to_owned(),
        }
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Yen {
        self.unit_price.times(self.quantity)
    }
}

/// Ordered set of cart lines, unique by product id.
///
/// Line order is the order products were first added; it matters for display
/// only. The `open` flag mirrors whether the cart panel is showing.
///
/// Persisted as `{"lines": [...], "open": bool}`, keeping the line order.
/// Loading re-applies the [`Cart::add`] rules, so duplicate product ids are
/// merged and zero-quantity lines dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredCart")]
pub struct Cart {
    lines: Vec<CartLine>,
    open: bool,
}

#[derive(Deserialize)]
struct StoredCart {
    #[serde(default)]
    lines: Vec<CartLine>,
    #[serde(default)]
    open: bool,
}

impl From<StoredCart> for Cart {
    fn from(stored: StoredCart) -> Self {
        let mut cart = Self::new();
        for line in stored.lines {
            cart.add(line);
        }
        cart.open = stored.open;
        cart
    }
}

impl Cart {
    /// Create an empty, closed cart.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            open: false,
        }
    }

    /// Add `line.quantity` units of a product.
    ///
    /// If the product is already in the cart its quantity is incremented and
    /// the existing name/price snapshot is kept; otherwise the line is
    /// appended. A zero quantity is ignored so that every stored line keeps a
    /// quantity of at least one. Adding opens the cart panel.
    pub fn add(&mut self, line: CartLine) {
        if line.quantity == 0 {
            return;
        }
        if let Some(existing) = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == line.product_id)
        {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
        } else {
            self.lines.push(line);
        }
        self.open = true;
    }

    /// Set the quantity of a line.
    ///
    /// A quantity of zero or below removes the line. Unknown product ids are
    /// ignored. Returns whether the cart changed.
    pub fn update_quantity(&mut self, product_id: &ProductId, quantity: i64) -> bool {
        if quantity <= 0 {
            return self.remove(product_id);
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        match self.lines.iter_mut().find(|l| &l.product_id == product_id) {
            Some(line) if line.quantity != quantity => {
                line.quantity = quantity;
                true
            }
            _ => false,
        }
    }

    /// Remove a line if present. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| &l.product_id != product_id);
        self.lines.len() != before
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Sum of line totals; this is the order subtotal.
    #[must_use]
    pub fn total_price(&self) -> Yen {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Lines in display order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Look up the line for a product.
    #[must_use]
    pub fn line(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.product_id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the cart panel is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    pub const fn open(&mut self) {
        self.open = true;
    }

    pub const fn close(&mut self) {
        self.open = false;
    }
}
