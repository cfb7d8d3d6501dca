//! Greedy change calculation.
//!
//! [`make_change`] is pure: it reads a till snapshot and proposes a payout.
//! Applying the payout is the caller's job, and must happen under the same
//! lock that produced the snapshot.

use crate::coin::Coin;
use crate::inventory::Till;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;

/// A specific change payout: denomination → number of coins.
///
/// Only denominations with a non-zero count are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakdown {
    coins: BTreeMap<Coin, u64>,
}

impl Breakdown {
    /// An empty payout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` coins of `coin`. Zero counts are ignored.
    pub fn add(&mut self, coin: Coin, count: u64) {
        if count > 0 {
            let held = self.coins.entry(coin).or_insert(0);
            *held = held.saturating_add(count);
        }
    }

    /// Number of coins of `coin` in the payout.
    pub fn count(&self, coin: Coin) -> u64 {
        self.coins.get(&coin).copied().unwrap_or(0)
    }

    /// Total value of the payout in pence.
    ///
    /// Exact for any payout drawn from a [`Till`]; a hand-built payout worth
    /// more than `u64::MAX` saturates.
    pub fn total(&self) -> u64 {
        self.coins
            .iter()
            .map(|(coin, count)| u64::from(coin.value()).saturating_mul(*count))
            .fold(0, u64::saturating_add)
    }

    /// Total number of coins handed out.
    pub fn coin_count(&self) -> u64 {
        self.coins.values().fold(0, |sum, &n| sum.saturating_add(n))
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    /// Entries in ascending denomination order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Coin, u64)> + '_ {
        self.coins.iter().map(|(&coin, &count)| (coin, count))
    }
}

/// Renders as `"1 x £1, 2 x 20p"`, largest denomination first.
impl fmt::Display for Breakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (coin, count)) in self.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} x {}", count, coin)?;
        }
        Ok(())
    }
}

/// Computes a payout of exactly `amount` pence from the coins in `till`.
///
/// Denominations are taken largest first, each as many times as both the
/// remaining amount and the till allow. Returns `None` when the greedy pass
/// cannot reach exactly zero; this can happen even if some other selection
/// of coins would have worked.
///
/// An amount of zero always yields an empty breakdown.
pub fn make_change(amount: u64, till: &Till) -> Option<Breakdown> {
    let mut remaining = amount;
    let mut breakdown = Breakdown::new();

    for coin in Coin::all().rev() {
        if remaining == 0 {
            break;
        }
        let value = u64::from(coin.value());
        let take = (remaining / value).min(till.count(coin));
        if take > 0 {
            breakdown.add(coin, take);
            remaining -= take * value;
        }
    }

    if remaining == 0 {
        Some(breakdown)
    } else {
        debug!(
            "Cannot make change for {}p: {}p left uncovered",
            amount, remaining
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(v: u32) -> Coin {
        Coin::new(v).unwrap()
    }

    fn till_with(entries: &[(u32, u64)]) -> Till {
        let mut till = Till::new();
        for &(d, n) in entries {
            till.add(coin(d), n).unwrap();
        }
        till
    }

    #[test]
    fn test_zero_amount_is_always_feasible() {
        let breakdown = make_change(0, &Till::new()).unwrap();
        assert!(breakdown.is_empty());
        assert_eq!(breakdown.total(), 0);
    }

    #[test]
    fn test_takes_largest_coins_first() {
        let till = till_with(&[(100, 5), (50, 5), (20, 5), (10, 5)]);
        let breakdown = make_change(180, &till).unwrap();

        assert_eq!(breakdown.count(coin(100)), 1);
        assert_eq!(breakdown.count(coin(50)), 1);
        assert_eq!(breakdown.count(coin(20)), 1);
        assert_eq!(breakdown.count(coin(10)), 1);
        assert_eq!(breakdown.total(), 180);
    }

    #[test]
    fn test_respects_available_counts() {
        let till = till_with(&[(50, 1), (20, 10)]);
        let breakdown = make_change(150, &till).unwrap();

        assert_eq!(breakdown.count(coin(50)), 1);
        assert_eq!(breakdown.count(coin(20)), 5);
        assert_eq!(breakdown.coin_count(), 6);
    }

    #[test]
    fn test_infeasible_when_till_short() {
        let till = till_with(&[(20, 2)]);
        assert!(make_change(50, &till).is_none());
    }

    #[test]
    fn test_empty_till_cannot_pay() {
        assert!(make_change(1, &Till::new()).is_none());
    }

    #[test]
    fn test_greedy_misses_non_greedy_solution() {
        // 60 = 3 x 20 exists, but greedy commits the 50 first and is left
        // with 10 it cannot cover.
        let till = till_with(&[(50, 1), (20, 3)]);
        assert!(make_change(60, &till).is_none());
    }

    #[test]
    fn test_does_not_mutate_till() {
        let till = till_with(&[(50, 2)]);
        let before = till.clone();
        make_change(100, &till).unwrap();
        assert_eq!(till, before);
    }

    #[test]
    fn test_breakdown_never_exceeds_till() {
        let till = till_with(&[(200, 1), (100, 2), (50, 1), (20, 3), (5, 4), (1, 9)]);
        for amount in 0..=till.total_value() {
            if let Some(breakdown) = make_change(amount, &till) {
                assert_eq!(breakdown.total(), amount);
                for (c, n) in breakdown.iter() {
                    assert!(n <= till.count(c));
                }
            }
        }
    }

    #[test]
    fn test_full_till_totals_without_overflow() {
        let mut till = Till::new();
        till.add(coin(200), u64::MAX / 200).unwrap();
        let all = till.total_value();

        let breakdown = make_change(all, &till).unwrap();
        assert_eq!(breakdown.total(), all);
        assert_eq!(breakdown.coin_count(), u64::MAX / 200);

        let mut huge = Breakdown::new();
        huge.add(coin(200), u64::MAX);
        huge.add(coin(200), 1);
        assert_eq!(huge.total(), u64::MAX);
        assert_eq!(huge.coin_count(), u64::MAX);
    }

    #[test]
    fn test_breakdown_display_descending() {
        let mut breakdown = Breakdown::new();
        breakdown.add(coin(20), 2);
        breakdown.add(coin(100), 1);
        breakdown.add(coin(5), 0);
        assert_eq!(breakdown.to_string(), "1 x £1, 2 x 20p");
        assert_eq!(Breakdown::new().to_string(), "");
    }
}
