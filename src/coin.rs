//! Coin denominations accepted by the machine.

use crate::error::{Result, VendError};
use std::fmt;

/// Every coin value the machine accepts, in pence, ascending.
pub const DENOMINATIONS: [u32; 8] = [1, 2, 5, 10, 20, 50, 100, 200];

/// A coin value known to be a member of [`DENOMINATIONS`].
///
/// Construction is the only validation point: once a `Coin` exists, the till
/// and change calculator can rely on it being a real denomination.
///
/// # Examples
///
/// ```
/// use vending_machine::Coin;
///
/// let coin = Coin::new(50).unwrap();
/// assert_eq!(coin.to_string(), "50p");
/// assert!(Coin::new(3).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coin(u32);

impl Coin {
    /// Validates `value` against the denomination set.
    pub fn new(value: u32) -> Result<Self> {
        if DENOMINATIONS.contains(&value) {
            Ok(Coin(value))
        } else {
            Err(VendError::InvalidDenomination(value))
        }
    }

    /// Face value in pence.
    pub fn value(self) -> u32 {
        self.0
    }

    /// All denominations, ascending.
    pub fn all() -> impl DoubleEndedIterator<Item = Coin> {
        DENOMINATIONS.into_iter().map(Coin)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 100 && self.0 % 100 == 0 {
            write!(f, "£{}", self.0 / 100)
        } else {
            write!(f, "{}p", self.0)
        }
    }
}
