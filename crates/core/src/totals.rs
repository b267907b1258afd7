//! Order totals: subtotal, consumption tax, shipping and grand total.
//!
//! Totals are always derived from line items and never stored on their own,
//! except as the snapshot written into an order document at creation time.
//!
//! ```
//! use muscle_shop_core::{Yen, calculate_totals};
//!
//! let totals = calculate_totals([(Yen::new(3000), 2)]);
//! assert_eq!(totals.subtotal, Yen::new(6000));
//! assert_eq!(totals.tax, Yen::new(600));
//! assert_eq!(totals.shipping, Yen::new(500));
//! assert_eq!(totals.total, Yen::new(7100));
//! ```

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::order::OrderItem;
use crate::types::Yen;

/// Consumption tax rate (10%).
pub const TAX_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Subtotal at or above which shipping is free.
pub const FREE_SHIPPING_THRESHOLD: Yen = Yen::new(10_000);

/// Flat shipping fee charged below the threshold.
pub const SHIPPING_FEE: Yen = Yen::new(500);

/// Derived money figures for a set of line items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Yen,
    pub tax: Yen,
    pub shipping: Yen,
    pub total: Yen,
}

impl Totals {
    /// Whether the shipping fee was waived.
    #[must_use]
    pub fn has_free_shipping(&self) -> bool {
        self.shipping == Yen::ZERO
    }
}

/// Anything that contributes `unit_price * quantity` to a subtotal.
pub trait PricedLine {
    fn unit_price(&self) -> Yen;
    fn quantity(&self) -> u32;
}

impl PricedLine for CartLine {
    fn unit_price(&self) -> Yen {
        self.unit_price
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }
}

impl PricedLine for OrderItem {
    fn unit_price(&self) -> Yen {
        self.unit_price
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }
}

impl<L: PricedLine + ?Sized> PricedLine for &L {
    fn unit_price(&self) -> Yen {
        (**self).unit_price()
    }

    fn quantity(&self) -> u32 {
        (**self).quantity()
    }
}

impl PricedLine for (Yen, u32) {
    fn unit_price(&self) -> Yen {
        self.0
    }

    fn quantity(&self) -> u32 {
        self.1
    }
}

/// Compute totals for a set of lines.
///
/// - `tax = floor(subtotal * 0.10)`
/// - `shipping = 0` if `subtotal >= 10,000`, else `500` (an empty set of lines
///   is still charged shipping)
/// - `total = subtotal + tax + shipping`
///
/// Pure: the same lines always produce the same totals.
pub fn calculate_totals<I>(lines: I) -> Totals
where
    I: IntoIterator,
    I::Item: PricedLine,
{
    let subtotal: Yen = lines
        .into_iter()
        .map(|line| line.unit_price().times(line.quantity()))
        .sum();
    let tax = tax_on(subtotal);
    let shipping = shipping_for(subtotal);

    Totals {
        subtotal,
        tax,
        shipping,
        total: subtotal + tax + shipping,
    }
}

/// Consumption tax on a subtotal, floored to whole yen.
#[must_use]
pub fn tax_on(subtotal: Yen) -> Yen {
    let tax = (Decimal::from(subtotal.as_i64()) * TAX_RATE).floor();
    // i64 * 0.10 always fits back into an i64
    Yen::new(tax.to_i64().unwrap_or_default())
}

/// Shipping fee for a subtotal.
#[must_use]
pub fn shipping_for(subtotal: Yen) -> Yen {
    if subtotal >= FREE_SHIPPING_THRESHOLD {
        Yen::ZERO
    } else {
        SHIPPING_FEE
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::ProductId;

    fn cart_line(price: i64, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(format!("p{price}")),
            name: "item".to_owned(),
            unit_price: Yen::new(price),
            quantity,
            image: String::new(),
        }
    }

    #[test]
    fn test_tax_rate_is_ten_percent() {
        assert_eq!(TAX_RATE, Decimal::new(10, 2));
    }

    #[test]
    fn test_single_line_below_threshold() {
        let totals = calculate_totals(&[cart_line(3000, 2)]);
        assert_eq!(
            totals,
            Totals {
                subtotal: Yen::new(6000),
                tax: Yen::new(600),
                shipping: Yen::new(500),
                total: Yen::new(7100),
            }
        );
    }

    #[test]
    fn test_free_shipping_over_threshold() {
        let totals = calculate_totals(&[cart_line(6000, 2)]);
        assert_eq!(totals.subtotal, Yen::new(12_000));
        assert_eq!(totals.shipping, Yen::ZERO);
        assert_eq!(totals.total, Yen::new(13_200));
        assert!(totals.has_free_shipping());
    }

    #[test]
    fn test_shipping_boundary() {
        assert_eq!(shipping_for(Yen::new(9999)), Yen::new(500));
        assert_eq!(shipping_for(Yen::new(10_000)), Yen::ZERO);
    }

    #[test]
    fn test_tax_floors() {
        assert_eq!(tax_on(Yen::new(999)), Yen::new(99));
        assert_eq!(tax_on(Yen::new(9)), Yen::ZERO);
    }

    #[test]
    fn test_empty_lines_still_pay_shipping() {
        let totals = calculate_totals(Vec::<CartLine>::new());
        assert_eq!(totals.subtotal, Yen::ZERO);
        assert_eq!(totals.tax, Yen::ZERO);
        assert_eq!(totals.shipping, Yen::new(500));
        assert_eq!(totals.total, Yen::new(500));
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let lines = vec![cart_line(1980, 3), cart_line(450, 1)];
        assert_eq!(calculate_totals(&lines), calculate_totals(&lines));
    }

    proptest! {
        #[test]
        fn prop_totals_invariants(
            lines in prop::collection::vec((0_i64..1_000_000, 0_u32..100), 0..20)
        ) {
            let priced: Vec<(Yen, u32)> =
                lines.iter().map(|&(p, q)| (Yen::new(p), q)).collect();
            let totals = calculate_totals(priced.iter().copied());

            let subtotal: i64 = lines.iter().map(|&(p, q)| p * i64::from(q)).sum();
            prop_assert_eq!(totals.subtotal, Yen::new(subtotal));
            prop_assert_eq!(totals.tax, Yen::new(subtotal / 10));
            prop_assert_eq!(totals.total, totals.subtotal + totals.tax + totals.shipping);
            prop_assert_eq!(totals.shipping == Yen::ZERO, subtotal >= 10_000);
        }

        #[test]
        fn prop_shipping_rule(subtotal in 0_i64..50_000) {
            let expected = if subtotal >= 10_000 { 0 } else { 500 };
            prop_assert_eq!(shipping_for(Yen::new(subtotal)), Yen::new(expected));
        }
    }
}
