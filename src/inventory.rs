//! Product catalog and coin till.
//!
//! [`Inventory`] is the plain data plus its invariant-checked mutations.
//! [`InventoryStore`] is the shared handle every session works through; it
//! guards one `Inventory` with a single mutex so compound check-then-mutate
//! sequences (a whole vend, a whole refund) run as one unit.
//!
//! # Invariants
//!
//! - Every stock and till count is `>= 0` (enforced by `u64` plus checked
//!   adjustment; a negative result is rejected, never clamped)
//! - Every till key is a valid [`Coin`]
//! - A product's price never changes after it is first loaded

use crate::change::Breakdown;
use crate::coin::Coin;
use crate::error::{Result, VendError};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A product on sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    /// Unique product name.
    pub name: String,

    /// Price in pence. Fixed once loaded.
    pub price: u64,

    /// Units left in the machine.
    pub stock: u64,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - Price: {}p, Quantity: {}",
            self.name, self.price, self.stock
        )
    }
}

/// A validated request to load product stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductEntry {
    name: String,
    price: u64,
    quantity: u64,
}

impl ProductEntry {
    /// Validates a load request.
    ///
    /// Rejects an empty name or a negative price or quantity with
    /// [`VendError::InvalidArgument`].
    pub fn new(name: impl Into<String>, price: i64, quantity: i64) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(VendError::InvalidArgument(
                "product name must not be empty".to_string(),
            ));
        }
        let price = u64::try_from(price).map_err(|_| {
            VendError::InvalidArgument(format!("negative price {} for {}", price, trimmed))
        })?;
        let quantity = u64::try_from(quantity).map_err(|_| {
            VendError::InvalidArgument(format!("negative quantity {} for {}", quantity, trimmed))
        })?;

        Ok(ProductEntry {
            name: trimmed.to_string(),
            price,
            quantity,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Coin counts by denomination.
///
/// Every denomination is always present, starting at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Till {
    counts: BTreeMap<Coin, u64>,
}

impl Till {
    /// An empty till with every denomination at zero.
    pub fn new() -> Self {
        Till {
            counts: Coin::all().map(|coin| (coin, 0)).collect(),
        }
    }

    /// Number of `coin` currently held.
    pub fn count(&self, coin: Coin) -> u64 {
        self.counts.get(&coin).copied().unwrap_or(0)
    }

    /// Adds `count` coins of `coin`.
    ///
    /// Fails with [`VendError::InvalidArgument`] if the till's total value
    /// would no longer fit in a `u64`; the till is unchanged in that case.
    pub fn add(&mut self, coin: Coin, count: u64) -> Result<()> {
        self.check_room(coin, count)?;
        *self.counts.entry(coin).or_insert(0) += count;
        Ok(())
    }

    /// Total value held, in pence.
    ///
    /// Cannot overflow: `add` refuses any count that would push the total
    /// past `u64::MAX`.
    pub fn total_value(&self) -> u64 {
        self.counts
            .iter()
            .map(|(coin, count)| u64::from(coin.value()) * count)
            .sum()
    }

    /// Entries in ascending denomination order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Coin, u64)> + '_ {
        self.counts.iter().map(|(&coin, &count)| (coin, count))
    }

    fn set(&mut self, coin: Coin, count: u64) {
        self.counts.insert(coin, count);
    }

    fn check_room(&self, coin: Coin, count: u64) -> Result<()> {
        u64::from(coin.value())
            .checked_mul(count)
            .and_then(|value| self.total_value().checked_add(value))
            .map(|_| ())
            .ok_or_else(|| {
                VendError::InvalidArgument(format!(
                    "{} x {} would overflow the till",
                    count, coin
                ))
            })
    }
}

impl Default for Till {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies a signed delta to a count, refusing to go negative.
fn apply_delta(key: &str, current: u64, delta: i64) -> Result<u64> {
    let next = if delta >= 0 {
        current.checked_add(delta.unsigned_abs())
    } else {
        current.checked_sub(delta.unsigned_abs())
    };
    next.ok_or_else(|| VendError::InvalidState {
        key: key.to_string(),
        current,
        delta,
    })
}

/// The machine's products and coins.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    products: BTreeMap<String, Product>,
    till: Till,
}

impl Inventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads product stock.
    ///
    /// A new name creates the product at the given price. An existing name
    /// only gains stock; the price in the entry is ignored. If any entry
    /// would overflow a stock count, nothing is loaded.
    pub fn load_products(&mut self, entries: &[ProductEntry]) -> Result<()> {
        let mut staged = self.products.clone();
        for entry in entries {
            match staged.get_mut(&entry.name) {
                Some(product) => {
                    product.stock =
                        product.stock.checked_add(entry.quantity).ok_or_else(|| {
                            VendError::InvalidArgument(format!(
                                "restocking {} by {} overflows its stock of {}",
                                entry.name, entry.quantity, product.stock
                            ))
                        })?;
                    debug!(
                        "Restocked {} by {} (price stays {}p)",
                        entry.name, entry.quantity, product.price
                    );
                }
                None => {
                    staged.insert(
                        entry.name.clone(),
                        Product {
                            name: entry.name.clone(),
                            price: entry.price,
                            stock: entry.quantity,
                        },
                    );
                    debug!(
                        "Loaded new product {} at {}p x {}",
                        entry.name, entry.price, entry.quantity
                    );
                }
            }
        }

        self.products = staged;
        Ok(())
    }

    /// Loads coins into the till.
    ///
    /// Every entry is validated before any count changes, so an invalid
    /// denomination, a negative quantity, or a quantity that would overflow
    /// the till leaves it untouched.
    pub fn load_change(&mut self, entries: &[(u32, i64)]) -> Result<()> {
        let mut staged = self.till.clone();
        for &(denomination, quantity) in entries {
            let coin = Coin::new(denomination)?;
            let quantity = u64::try_from(quantity).map_err(|_| {
                VendError::InvalidArgument(format!(
                    "negative quantity {} for coin {}",
                    quantity, coin
                ))
            })?;
            staged.add(coin, quantity)?;
            debug!("Loaded {} x {} into till", quantity, coin);
        }

        self.till = staged;
        Ok(())
    }

    /// All products, in name order.
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn product(&self, name: &str) -> Option<&Product> {
        self.products.get(name)
    }

    pub fn till(&self) -> &Till {
        &self.till
    }

    /// Applies `delta` to a product's stock and returns the new stock.
    pub fn adjust_stock(&mut self, name: &str, delta: i64) -> Result<u64> {
        let product = self
            .products
            .get_mut(name)
            .ok_or_else(|| VendError::NotFound(name.to_string()))?;
        product.stock = apply_delta(name, product.stock, delta)?;
        Ok(product.stock)
    }

    /// Applies `delta` to a denomination's count and returns the new count.
    pub fn adjust_till(&mut self, denomination: u32, delta: i64) -> Result<u64> {
        let coin = Coin::new(denomination)?;
        let current = self.till.count(coin);
        let next = apply_delta(&coin.to_string(), current, delta)?;
        if next > current {
            self.till.check_room(coin, next - current)?;
        }
        self.till.set(coin, next);
        Ok(next)
    }

    /// Removes a whole payout from the till.
    ///
    /// All denominations are checked before any is debited.
    pub fn dispense(&mut self, breakdown: &Breakdown) -> Result<()> {
        for (coin, count) in breakdown.iter() {
            let held = self.till.count(coin);
            if count > held {
                return Err(VendError::InvalidState {
                    key: coin.to_string(),
                    current: held,
                    delta: -i64::try_from(count).unwrap_or(i64::MAX),
                });
            }
        }
        for (coin, count) in breakdown.iter() {
            let held = self.till.count(coin);
            self.till.set(coin, held - count);
        }
        Ok(())
    }
}

/// Shared, lock-guarded handle to one [`Inventory`].
///
/// Cloning the handle shares the same underlying inventory.
#[derive(Debug, Clone, Default)]
pub struct InventoryStore {
    inner: Arc<Mutex<Inventory>>,
}

impl InventoryStore {
    /// Creates a store around an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the store lock for a compound operation.
    ///
    /// Every mutation validates before it writes, so a poisoned lock still
    /// guards a consistent inventory and is recovered.
    pub fn lock(&self) -> MutexGuard<'_, Inventory> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load_products(&self, entries: &[ProductEntry]) -> Result<()> {
        self.lock().load_products(entries)
    }

    pub fn load_change(&self, entries: &[(u32, i64)]) -> Result<()> {
        self.lock().load_change(entries)
    }

    /// Snapshot of all products, in name order.
    pub fn get_products(&self) -> Vec<Product> {
        self.lock().products().cloned().collect()
    }

    /// Snapshot of the till.
    pub fn get_till(&self) -> Till {
        self.lock().till().clone()
    }

    pub fn adjust_stock(&self, name: &str, delta: i64) -> Result<u64> {
        self.lock().adjust_stock(name, delta)
    }

    pub fn adjust_till(&self, denomination: u32, delta: i64) -> Result<u64> {
        self.lock().adjust_till(denomination, delta)
    }
}
