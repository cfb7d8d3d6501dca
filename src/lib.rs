//! # Vending Machine
//!
//! A coin-operated vending machine engine: a priced, counted product catalog,
//! a till of coin denominations, and per-customer sessions that bank coins,
//! select a product, and vend it with exact change.
//!
//! ## Design Principles
//!
//! - **Integer money**: every amount is `u64` pence; display goes through
//!   `rust_decimal`, never floating point
//! - **Money conservation**: till value plus outstanding session credit only
//!   ever drops by the price of a vended product
//! - **All-or-nothing vends**: a declined vend leaves stock, till and session
//!   exactly as they were
//! - **Greedy change**: largest coins first, bounded by what the till holds
//!
//! ## Example
//!
//! ```
//! use vending_machine::{ProductEntry, VendingMachine};
//!
//! let machine = VendingMachine::new();
//! machine
//!     .inventory()
//!     .load_products(&[ProductEntry::new("Water", 100, 10).unwrap()])
//!     .unwrap();
//! machine.inventory().load_change(&[(50, 10)]).unwrap();
//!
//! let session = machine.start_session();
//! machine.select_product(&session, "Water").unwrap();
//! machine.insert_coin(&session, 200).unwrap();
//!
//! let outcome = machine.vend(&session).unwrap();
//! assert_eq!(outcome.to_string(), "Dispensed Water, Change given: 2 x 50p");
//! ```

pub mod change;
pub mod coin;
pub mod error;
pub mod inventory;
pub mod machine;
pub mod money;
pub mod script;
pub mod session;

pub use change::{make_change, Breakdown};
pub use coin::{Coin, DENOMINATIONS};
pub use error::{Result, VendError};
pub use inventory::{Inventory, InventoryStore, Product, ProductEntry, Till};
pub use machine::{ResetReceipt, VendFailure, VendOutcome, VendingMachine};
pub use money::Amount;
pub use script::{Command, ScriptEvent, ScriptRecord, ScriptRunner};
pub use session::{Session, SessionRegistry, SessionState};
