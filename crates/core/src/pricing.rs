//! Delivery fee policy and derived order totals.
//!
//! The cart, the payment summary and the guest checkout all show the same
//! subtotal / delivery / total breakdown, so the policy lives here once.
//! Totals are always derived from line items (unit price × quantity) rather
//! than from aggregate totals cached by the API.

use rust_decimal::Decimal;

use crate::types::Price;

/// Subtotal (PLN) at or above which delivery is free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(250, 0, 0, false, 0);

/// Flat delivery fee (PLN) charged below the threshold.
pub const DELIVERY_FEE: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

/// Delivery fee for a given subtotal.
///
/// ```
/// use myshop_core::{Price, delivery_fee};
/// use rust_decimal::Decimal;
///
/// assert_eq!(delivery_fee(Price::pln(Decimal::from(249))).amount, Decimal::from(15));
/// assert!(delivery_fee(Price::pln(Decimal::from(250))).is_zero());
/// ```
#[must_use]
pub fn delivery_fee(subtotal: Price) -> Price {
    if subtotal.amount >= FREE_SHIPPING_THRESHOLD {
        Price::new(Decimal::ZERO, subtotal.currency_code)
    } else {
        Price::new(DELIVERY_FEE, subtotal.currency_code)
    }
}

/// Subtotal, delivery and grand total for a set of order lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    /// Sum of unit price × quantity over all lines.
    pub subtotal: Price,
    /// Delivery fee after applying the free-shipping threshold.
    pub delivery: Price,
    /// `subtotal + delivery`.
    pub grand_total: Price,
}

impl OrderTotals {
    /// Compute totals from `(unit_price, quantity)` pairs.
    #[must_use]
    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = (Price, u32)>,
    {
        let subtotal = lines
            .into_iter()
            .map(|(unit_price, quantity)| unit_price.times(quantity))
            .sum();
        Self::from_subtotal(subtotal)
    }

    /// Compute totals from an already-summed subtotal.
    #[must_use]
    pub fn from_subtotal(subtotal: Price) -> Self {
        let delivery = delivery_fee(subtotal);
        Self {
            subtotal,
            delivery,
            grand_total: subtotal + delivery,
        }
    }

    /// Whether the free-shipping threshold has been reached.
    #[must_use]
    pub const fn has_free_delivery(&self) -> bool {
        self.delivery.is_zero()
    }

    /// How much more must be spent to get free delivery, if anything.
    #[must_use]
    pub fn free_shipping_remaining(&self) -> Option<Price> {
        if self.has_free_delivery() {
            None
        } else {
            Some(Price::new(
                FREE_SHIPPING_THRESHOLD - self.subtotal.amount,
                self.subtotal.currency_code,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pln(amount: i64) -> Price {
        Price::pln(Decimal::from(amount))
    }

    #[test]
    fn test_fee_below_threshold() {
        let totals = OrderTotals::from_lines([(pln(100), 2)]);
        assert_eq!(totals.subtotal, pln(200));
        assert_eq!(totals.delivery, pln(15));
        assert_eq!(totals.grand_total, pln(215));
        assert_eq!(totals.free_shipping_remaining(), Some(pln(50)));
    }

    #[test]
    fn test_fee_waived_at_exact_threshold() {
        let totals = OrderTotals::from_lines([(pln(125), 2)]);
        assert_eq!(totals.subtotal, pln(250));
        assert!(totals.has_free_delivery());
        assert_eq!(totals.grand_total, pln(250));
        assert_eq!(totals.free_shipping_remaining(), None);
    }

    #[test]
    fn test_fee_waived_above_threshold() {
        let totals = OrderTotals::from_lines([(pln(200), 1), (pln(60), 1)]);
        assert_eq!(totals.delivery, Price::zero());
        assert_eq!(totals.grand_total, pln(260));
    }

    #[test]
    fn test_fractional_prices_just_below_threshold() {
        let totals = OrderTotals::from_lines([(Price::pln(Decimal::new(24999, 2)), 1)]);
        assert_eq!(totals.delivery, pln(15));
        assert_eq!(totals.grand_total.amount, Decimal::new(26499, 2));
    }

    #[test]
    fn test_empty_order_still_charges_delivery() {
        let totals = OrderTotals::from_lines(std::iter::empty());
        assert!(totals.subtotal.is_zero());
        assert_eq!(totals.delivery, pln(15));
    }
}
