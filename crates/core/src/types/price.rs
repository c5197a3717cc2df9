//! Type-safe price representation using decimal arithmetic.
//!
//! The shop API sends money as decimal strings (`"49.99"`) or plain JSON
//! numbers depending on the field; both deserialize into [`Decimal`] without
//! going through floating point.

use core::fmt;
use core::ops::Add;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (złoty, not grosze).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A price in the shop currency.
    #[must_use]
    pub const fn pln(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::PLN)
    }

    /// Zero in the shop currency.
    #[must_use]
    pub const fn zero() -> Self {
        Self::pln(Decimal::ZERO)
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self::new(self.amount * Decimal::from(quantity), self.currency_code)
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl Default for Price {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.amount + rhs.amount, self.currency_code)
    }
}

impl core::iter::Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

/// Formats as `"123.45 PLN"`, rounding half away from zero to two places.
impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self
            .amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        write!(f, "{rounded:.2} {}", self.currency_code.code())
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    PLN,
    EUR,
}

impl CurrencyCode {
    /// The three-letter code shown next to amounts.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PLN => "PLN",
            Self::EUR => "EUR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_pads_to_two_places() {
        assert_eq!(Price::pln(Decimal::new(15, 0)).to_string(), "15.00 PLN");
        assert_eq!(Price::pln(Decimal::new(12345, 2)).to_string(), "123.45 PLN");
    }

    #[test]
    fn test_display_rounds_half_away_from_zero() {
        assert_eq!(Price::pln(Decimal::new(10005, 3)).to_string(), "10.01 PLN");
    }

    #[test]
    fn test_times_and_sum() {
        let unit = Price::pln(Decimal::new(4999, 2));
        let total: Price = [unit.times(2), unit].into_iter().sum();
        assert_eq!(total.amount, Decimal::new(14997, 2));
    }

    #[test]
    fn test_zero() {
        assert!(Price::zero().is_zero());
        assert!(!Price::pln(Decimal::ONE).is_zero());
    }
}
