//! Display of minor-unit amounts.
//!
//! Amounts are stored everywhere as `u64` pence. Conversion to pounds for
//! display goes through `rust_decimal` so no floating-point value ever
//! touches money.

use rust_decimal::Decimal;
use std::fmt;

/// A pence amount formatted for customers.
///
/// Amounts below one pound render in pence, everything else in pounds with
/// exactly two decimal places.
///
/// # Examples
///
/// ```
/// use vending_machine::Amount;
///
/// assert_eq!(Amount(50).to_string(), "50p");
/// assert_eq!(Amount(125).to_string(), "£1.25");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(pub u64);

impl Amount {
    /// Number of minor units per major unit.
    pub const SCALE: u32 = 2;

    /// The amount in pounds as an exact decimal.
    pub fn to_pounds(self) -> Decimal {
        let mut pounds = Decimal::from(self.0) / Decimal::ONE_HUNDRED;
        pounds.rescale(Self::SCALE);
        pounds
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 100 {
            write!(f, "{}p", self.0)
        } else {
            write!(f, "£{:.2}", self.to_pounds())
        }
    }
}
