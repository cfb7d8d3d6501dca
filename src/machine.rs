//! Transaction engine.
//!
//! Drives each session through select → insert → vend/reset against the
//! shared [`InventoryStore`]. Every operation that touches both a session and
//! the inventory takes the session lock first, then the store lock, and holds
//! both until it is done. That ordering is the only one used anywhere, and it
//! makes each vend's stock check, change computation, stock decrement and
//! till payout one atomic unit relative to every other session.
//!
//! A reset closes its session and drops it from the registry before
//! releasing the session lock. Anyone who was waiting on that lock sees the
//! session closed and retries against a fresh one, so no coin is ever
//! credited to a session that has already been paid out.

use crate::change::{make_change, Breakdown};
use crate::coin::Coin;
use crate::error::{Result, VendError};
use crate::inventory::InventoryStore;
use crate::money::Amount;
use crate::session::{lock_session, Session, SessionRegistry};
use log::{debug, info};
use std::fmt;

/// Why a vend did not dispense.
///
/// These are expected operational outcomes, not faults. When one is
/// reported, nothing in the inventory or the session has changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendFailure {
    /// The session has no product selected.
    NoProductSelected,

    /// Credit is below the price; `shortfall` pence are still needed.
    InsufficientFunds { shortfall: u64 },

    /// The selected product sold out after it was selected.
    OutOfStock,

    /// The till cannot pay back exactly `amount` pence.
    ChangeUnavailable { amount: u64 },
}

impl fmt::Display for VendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendFailure::NoProductSelected => f.write_str("No product selected"),
            VendFailure::InsufficientFunds { shortfall } => {
                write!(f, "Insufficient funds. Please insert {}p more.", shortfall)
            }
            VendFailure::OutOfStock => f.write_str("Product out of stock"),
            VendFailure::ChangeUnavailable { .. } => f.write_str("Unable to provide change"),
        }
    }
}

/// Result of a vend attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendOutcome {
    /// The product was released and `change` paid out.
    Dispensed { product: String, change: Breakdown },

    /// Nothing happened; see the reason.
    Declined(VendFailure),
}

impl VendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, VendOutcome::Dispensed { .. })
    }

    /// The failure reason, if the vend was declined.
    pub fn failure(&self) -> Option<&VendFailure> {
        match self {
            VendOutcome::Declined(reason) => Some(reason),
            VendOutcome::Dispensed { .. } => None,
        }
    }
}

impl fmt::Display for VendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendOutcome::Dispensed { product, change } => {
                write!(f, "Dispensed {}", product)?;
                if !change.is_empty() {
                    write!(f, ", Change given: {}", change)?;
                }
                Ok(())
            }
            VendOutcome::Declined(reason) => write!(f, "{}", reason),
        }
    }
}

/// Money returned when a session is reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReceipt {
    pub session_id: String,
    pub change: Breakdown,
}

impl fmt::Display for ResetReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Session reset successfully")?;
        if !self.change.is_empty() {
            write!(f, ", Change given: {}", self.change)?;
        }
        Ok(())
    }
}

/// One vending machine: a shared inventory and the sessions using it.
#[derive(Debug, Default)]
pub struct VendingMachine {
    inventory: InventoryStore,
    sessions: SessionRegistry,
}

impl VendingMachine {
    /// Creates a machine with an empty catalog and till.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inventory(&self) -> &InventoryStore {
        &self.inventory
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Registers a new idle session and returns its id.
    pub fn start_session(&self) -> String {
        self.sessions.start_session()
    }

    /// Chooses a product for the session.
    ///
    /// Fails with [`VendError::NotFound`] if the product is unknown or has no
    /// stock. Selection does not reserve stock, and any credit already
    /// inserted is kept.
    pub fn select_product(&self, session_id: &str, name: &str) -> Result<()> {
        self.with_session(session_id, |session| {
            let available = self
                .inventory
                .lock()
                .product(name)
                .map(|p| p.stock > 0)
                .unwrap_or(false);
            if !available {
                return Err(VendError::NotFound(name.to_string()));
            }

            session.select(name);
            debug!(
                "Session {}: selected {} ({:?})",
                session.id(),
                name,
                session.state()
            );
            Ok(())
        })
    }

    /// Banks a coin and credits the session. Returns the new credit.
    ///
    /// The coin goes straight into the till; there is no holding area.
    pub fn insert_coin(&self, session_id: &str, denomination: u32) -> Result<u64> {
        let coin = Coin::new(denomination)?;
        self.with_session(session_id, |session| -> Result<u64> {
            self.inventory.lock().adjust_till(coin.value(), 1)?;
            session.add_credit(u64::from(coin.value()));

            debug!(
                "Session {}: inserted {}, credit now {} ({:?})",
                session.id(),
                coin,
                Amount(session.credit()),
                session.state()
            );
            Ok(session.credit())
        })
    }

    /// Attempts to dispense the selected product and pay change.
    ///
    /// Business outcomes come back as [`VendOutcome::Declined`] with nothing
    /// mutated. An `Err` means an internal invariant check failed.
    pub fn vend(&self, session_id: &str) -> Result<VendOutcome> {
        self.with_session(session_id, |session| -> Result<VendOutcome> {
            let mut inventory = self.inventory.lock();

            let name = match session.selected_product() {
                Some(name) => name.to_string(),
                None => return Ok(decline(session, VendFailure::NoProductSelected)),
            };
            let (price, stock) = match inventory.product(&name) {
                Some(product) => (product.price, product.stock),
                None => return Ok(decline(session, VendFailure::OutOfStock)),
            };

            let credit = session.credit();
            if credit < price {
                return Ok(decline(
                    session,
                    VendFailure::InsufficientFunds {
                        shortfall: price - credit,
                    },
                ));
            }
            if stock == 0 {
                return Ok(decline(session, VendFailure::OutOfStock));
            }

            let change_due = credit - price;
            let change = match make_change(change_due, inventory.till()) {
                Some(change) => change,
                None => {
                    return Ok(decline(
                        session,
                        VendFailure::ChangeUnavailable { amount: change_due },
                    ))
                }
            };

            // Checks above guarantee both succeed; dispense still verifies.
            inventory.dispense(&change)?;
            inventory.adjust_stock(&name, -1)?;
            session.clear();

            info!(
                "Session {}: sold {} for {} from {} credit",
                session.id(),
                name,
                Amount(price),
                Amount(credit)
            );
            let outcome = VendOutcome::Dispensed {
                product: name,
                change,
            };
            info!("Session {}: {}", session.id(), outcome);
            Ok(outcome)
        })
    }

    /// Returns the session's credit as change and removes the session.
    ///
    /// Resetting an unknown or empty session pays out nothing. If the till
    /// can no longer cover the credit, [`VendError::InvalidState`] is
    /// returned and nothing changes.
    pub fn reset(&self, session_id: &str) -> Result<ResetReceipt> {
        let change = loop {
            let handle = match self.sessions.get(session_id) {
                Some(handle) => handle,
                None => break Breakdown::new(),
            };
            let mut session = lock_session(&handle);
            if session.is_closed() {
                // Another reset got here first; look again.
                continue;
            }
            let mut inventory = self.inventory.lock();

            let credit = session.credit();
            let change = make_change(credit, inventory.till()).ok_or_else(|| {
                VendError::InvalidState {
                    key: format!("session {}", session_id),
                    current: inventory.till().total_value(),
                    delta: -i64::try_from(credit).unwrap_or(i64::MAX),
                }
            })?;
            inventory.dispense(&change)?;
            session.clear();
            session.close();
            self.sessions.destroy(session_id);
            break change;
        };

        let receipt = ResetReceipt {
            session_id: session_id.to_string(),
            change,
        };
        info!(
            "Session {}: {} ({} returned)",
            session_id,
            receipt,
            Amount(receipt.change.total())
        );
        Ok(receipt)
    }

    /// Value of every coin in the till, in pence.
    pub fn till_value(&self) -> u64 {
        self.inventory.lock().till().total_value()
    }

    /// Credit banked by live sessions and not yet spent or returned.
    ///
    /// Till value minus this is the float plus takings: inserting a coin or
    /// resetting a session never changes it, and a vend raises it by exactly
    /// the product price.
    pub fn outstanding_credit(&self) -> u64 {
        self.sessions.total_credit()
    }

    /// Runs `op` against the open session for `session_id`, creating it if
    /// absent.
    ///
    /// A handle taken from the registry can be closed by a reset before its
    /// lock is acquired; a closed session is never written to, and the
    /// lookup is retried against the registry's current entry instead.
    fn with_session<T>(&self, session_id: &str, op: impl FnOnce(&mut Session) -> T) -> T {
        loop {
            let handle = self.sessions.get_or_create(session_id);
            let mut session = lock_session(&handle);
            if !session.is_closed() {
                return op(&mut *session);
            }
        }
    }
}

fn decline(session: &Session, reason: VendFailure) -> VendOutcome {
    debug!(
        "Session {}: vend declined ({:?}): {}",
        session.id(),
        session.state(),
        reason
    );
    VendOutcome::Declined(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ProductEntry;
    use std::sync::Arc;

    fn machine_with(products: &[(&str, i64, i64)], coins: &[(u32, i64)]) -> VendingMachine {
        let machine = VendingMachine::new();
        let entries: Vec<ProductEntry> = products
            .iter()
            .map(|&(n, p, q)| ProductEntry::new(n, p, q).unwrap())
            .collect();
        machine.inventory().load_products(&entries).unwrap();
        machine.inventory().load_change(coins).unwrap();
        machine
    }

    fn stock(machine: &VendingMachine, name: &str) -> u64 {
        machine.inventory().lock().product(name).unwrap().stock
    }

    #[test]
    fn test_exact_payment_vends_without_change() {
        let machine = machine_with(&[("Water", 100, 10)], &[(50, 50), (20, 10), (10, 10)]);
        machine.select_product("s", "Water").unwrap();
        machine.insert_coin("s", 100).unwrap();

        let outcome = machine.vend("s").unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.to_string(), "Dispensed Water");
        assert_eq!(stock(&machine, "Water"), 9);
    }

    #[test]
    fn test_overpayment_returns_change() {
        let machine = machine_with(&[("Chips", 75, 5)], &[(20, 5), (5, 5)]);
        machine.select_product("s", "Chips").unwrap();
        machine.insert_coin("s", 100).unwrap();

        let outcome = machine.vend("s").unwrap();
        match &outcome {
            VendOutcome::Dispensed { change, .. } => assert_eq!(change.total(), 25),
            other => panic!("Expected Dispensed, got {:?}", other),
        }
        assert_eq!(outcome.to_string(), "Dispensed Chips, Change given: 1 x 20p, 1 x 5p");
    }

    #[test]
    fn test_vend_without_selection() {
        let machine = machine_with(&[], &[]);
        machine.insert_coin("s", 50).unwrap();
        let outcome = machine.vend("s").unwrap();
        assert_eq!(outcome.failure(), Some(&VendFailure::NoProductSelected));
        assert_eq!(outcome.to_string(), "No product selected");
    }

    #[test]
    fn test_insufficient_funds_reports_shortfall() {
        let machine = machine_with(&[("Juice", 150, 5)], &[]);
        machine.select_product("s", "Juice").unwrap();
        machine.insert_coin("s", 100).unwrap();

        let outcome = machine.vend("s").unwrap();
        assert_eq!(
            outcome.failure(),
            Some(&VendFailure::InsufficientFunds { shortfall: 50 })
        );
        assert_eq!(outcome.to_string(), "Insufficient funds. Please insert 50p more.");
        assert_eq!(stock(&machine, "Juice"), 5);
    }

    #[test]
    fn test_shortfall_over_a_pound_is_shown_in_pence() {
        let machine = machine_with(&[("Sandwich", 350, 2)], &[]);
        machine.select_product("s", "Sandwich").unwrap();
        machine.insert_coin("s", 200).unwrap();

        let outcome = machine.vend("s").unwrap();
        assert_eq!(
            outcome.to_string(),
            "Insufficient funds. Please insert 150p more."
        );
        assert_eq!(
            VendFailure::InsufficientFunds { shortfall: 1 }.to_string(),
            "Insufficient funds. Please insert 1p more."
        );
    }

    #[test]
    fn test_select_unknown_or_empty_product() {
        let machine = machine_with(&[("Gone", 10, 0)], &[]);
        assert!(matches!(
            machine.select_product("s", "Nope"),
            Err(VendError::NotFound(_))
        ));
        assert!(matches!(
            machine.select_product("s", "Gone"),
            Err(VendError::NotFound(_))
        ));
    }

    #[test]
    fn test_switching_product_keeps_credit() {
        let machine = machine_with(&[("A", 200, 1), ("B", 50, 1)], &[]);
        machine.select_product("s", "A").unwrap();
        machine.insert_coin("s", 50).unwrap();
        machine.select_product("s", "B").unwrap();

        let outcome = machine.vend("s").unwrap();
        assert!(outcome.is_success());
    }

    #[test]
    fn test_invalid_coin_is_rejected_before_banking() {
        let machine = machine_with(&[], &[]);
        assert!(matches!(
            machine.insert_coin("s", 3),
            Err(VendError::InvalidDenomination(3))
        ));
        assert_eq!(machine.till_value(), 0);
    }

    #[test]
    fn test_change_unavailable_leaves_everything() {
        let machine = machine_with(&[("Bar", 50, 3)], &[]);
        machine.select_product("s", "Bar").unwrap();
        machine.insert_coin("s", 100).unwrap();
        let till_before = machine.inventory().get_till();

        let outcome = machine.vend("s").unwrap();
        assert_eq!(
            outcome.failure(),
            Some(&VendFailure::ChangeUnavailable { amount: 50 })
        );
        assert_eq!(outcome.to_string(), "Unable to provide change");
        assert_eq!(machine.inventory().get_till(), till_before);
        assert_eq!(stock(&machine, "Bar"), 3);

        let handle = machine.sessions().get("s").unwrap();
        let session = lock_session(&handle);
        assert_eq!(session.credit(), 100);
        assert_eq!(session.selected_product(), Some("Bar"));
    }

    #[test]
    fn test_reset_returns_credit_and_removes_session() {
        let machine = machine_with(&[], &[]);
        machine.insert_coin("s", 100).unwrap();
        machine.insert_coin("s", 20).unwrap();

        let receipt = machine.reset("s").unwrap();
        assert_eq!(receipt.change.total(), 120);
        assert_eq!(
            receipt.to_string(),
            "Session reset successfully, Change given: 1 x £1, 1 x 20p"
        );
        assert!(machine.sessions().get("s").is_none());
        assert_eq!(machine.till_value(), 0);
        assert_eq!(machine.outstanding_credit(), 0);
    }

    #[test]
    fn test_reset_empty_session_is_noop() {
        let machine = machine_with(&[], &[(50, 2)]);
        let id = machine.start_session();
        let receipt = machine.reset(&id).unwrap();
        assert!(receipt.change.is_empty());
        assert_eq!(receipt.to_string(), "Session reset successfully");
        assert_eq!(machine.inventory().get_till().total_value(), 100);

        let receipt = machine.reset("never-seen").unwrap();
        assert!(receipt.change.is_empty());
    }

    #[test]
    fn test_reset_fails_cleanly_when_till_drained() {
        let machine = machine_with(&[], &[]);
        machine.insert_coin("s", 50).unwrap();
        machine.inventory().adjust_till(50, -1).unwrap();

        assert!(matches!(
            machine.reset("s"),
            Err(VendError::InvalidState { .. })
        ));
        let handle = machine.sessions().get("s").unwrap();
        assert_eq!(lock_session(&handle).credit(), 50);
    }

    #[test]
    fn test_reset_closes_the_session_it_paid_out() {
        let machine = machine_with(&[], &[]);
        machine.insert_coin("s", 100).unwrap();
        let stale = machine.sessions().get("s").unwrap();

        machine.reset("s").unwrap();
        assert!(lock_session(&stale).is_closed());
        assert_eq!(lock_session(&stale).credit(), 0);

        // The next coin lands in a fresh session, not the paid-out one.
        assert_eq!(machine.insert_coin("s", 50).unwrap(), 50);
        let fresh = machine.sessions().get("s").unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_eq!(lock_session(&stale).credit(), 0);
        assert_eq!(machine.till_value(), machine.outstanding_credit());
    }

    #[test]
    fn test_failed_reset_keeps_session_open() {
        let machine = machine_with(&[], &[]);
        machine.insert_coin("s", 50).unwrap();
        machine.inventory().adjust_till(50, -1).unwrap();
        assert!(machine.reset("s").is_err());

        let handle = machine.sessions().get("s").unwrap();
        assert!(!lock_session(&handle).is_closed());
        assert_eq!(machine.insert_coin("s", 20).unwrap(), 70);
    }

    #[test]
    fn test_vend_adds_exactly_the_price_to_takings() {
        let machine = machine_with(&[("Soda", 125, 10)], &[(50, 4), (20, 4), (5, 4)]);
        let takings = |m: &VendingMachine| m.till_value() - m.outstanding_credit();
        let before = takings(&machine);

        machine.insert_coin("s", 200).unwrap();
        assert_eq!(takings(&machine), before);
        assert_eq!(machine.outstanding_credit(), 200);

        machine.select_product("s", "Soda").unwrap();
        assert!(machine.vend("s").unwrap().is_success());
        assert_eq!(takings(&machine), before + 125);
    }
}
