//! Everything one settlement changes, collected before anything is written.
//!
//! A `LedgerPlan` is the only thing `DatabaseConnection::commit_ledger`
//! accepts, and that is the only code path that moves points or pool value.
//! Balance changes are kept as deltas so they commit as `+=` increments.

use common::{ModifierItem, ParlayStatus};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct EntryResolution {
    pub entry: String,
    pub won: bool,
}

/// One use of a card. The commit decrements its stored count and deletes it at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUse {
    pub item: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegResolution {
    pub leg: String,
    pub won: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParlayUpdate {
    pub parlay: String,
    pub status: ParlayStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerPlan {
    pub wager: String,
    pub guild: String,
    pub user_deltas: BTreeMap<String, f64>,
    pub pool_delta: f64,
    pub entries: Vec<EntryResolution>,
    pub consumed: Vec<ItemUse>,
    pub legs: Vec<LegResolution>,
    pub parlays: Vec<ParlayUpdate>,
}

impl LedgerPlan {
    pub fn new(wager: impl Into<String>, guild: impl Into<String>) -> Self {
        Self {
            wager: wager.into(),
            guild: guild.into(),
            ..Self::default()
        }
    }

    /// Adds `amount` to a user's balance change. Negative amounts take value back.
    pub fn credit(&mut self, user: &str, amount: f64) {
        if amount == 0.0 {
            return;
        }
        *self.user_deltas.entry(user.to_string()).or_insert(0.0) += amount;
    }

    pub fn to_pool(&mut self, amount: f64) {
        self.pool_delta += amount;
    }

    /// Moves `amount` out of a user's credit and into the pool.
    pub fn divert(&mut self, user: &str, amount: f64) {
        self.credit(user, -amount);
        self.to_pool(amount);
    }

    pub fn user_delta(&self, user: &str) -> f64 {
        self.user_deltas.get(user).copied().unwrap_or(0.0)
    }

    pub fn is_consumed(&self, item: &str) -> bool {
        self.consumed.iter().any(|used| used.item == item)
    }

    /// Records one use of a card. Returns false if it was already used by this plan.
    pub fn consume(&mut self, item: &ModifierItem) -> bool {
        if self.is_consumed(&item.id) {
            return false;
        }
        self.consumed.push(ItemUse {
            item: item.id.clone(),
        });
        true
    }

    pub fn resolve_entry(&mut self, entry: &str, won: bool) {
        self.entries.push(EntryResolution {
            entry: entry.to_string(),
            won,
        });
    }

    /// Value the plan creates (positive) or destroys (negative) across users and pool.
    pub fn net_change(&self) -> f64 {
        self.user_deltas.values().sum::<f64>() + self.pool_delta
    }
}
