//! Card catalog.
//!
//! Every card a user can hold is described once in a `ModifierRegistry`,
//! built at start-up and handed to the settlement planner. Effects are a
//! closed set of `ModifierKind`s; the per-bettor ones are applied by
//! [`pipeline`], the guild-wide ones by [`redistribution`].

pub mod pipeline;
pub mod redistribution;

use chrono::Duration;
use std::collections::HashMap;

pub const UNO_REVERSE: &str = "uno_reverse";
pub const DOUBLE_DOWN: &str = "double_down";
pub const GAMBLER: &str = "gambler";
pub const HOT_STREAK: &str = "hot_streak";
pub const HEX: &str = "hex";
pub const THE_TOWER: &str = "the_tower";
pub const LOYAL_FAN: &str = "loyal_fan";
pub const BET_INSURANCE: &str = "bet_insurance";
pub const GET_OUT_OF_JAIL: &str = "get_out_of_jail";
pub const VAMPIRE: &str = "vampire";
pub const THE_DEVIL: &str = "the_devil";
pub const THE_EMPEROR: &str = "the_emperor";
pub const THE_LOVERS: &str = "the_lovers";
pub const ANTI_ANTI_BET: &str = "anti_anti_bet";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModifierKind {
    /// Inverts win/loss on the one wager the card targets.
    OutcomeFlip,
    PayoutMultiplier(f64),
    /// Coin flip: doubles the payout or wipes it.
    DoubleOrNothing,
    FlatBonus(f64),
    /// Removes this fraction of the running payout.
    PayoutReduction(f64),
    /// Refunds the stake when the pick was the user's own team and it lost outright.
    SubscribedTeamRefund,
    /// Refunds this fraction of the stake not yet refunded.
    PartialRefund(f64),
    FullRefund,
    Siphon { rate: f64, cap: f64 },
    SelfDiversion { rate: f64 },
    GuildDiversion { rate: f64 },
    Copy { rate: f64 },
    CounterWager { multiplier: f64 },
}

/// Which part of a bettor's settlement a kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Outcome,
    Win,
    Loss,
    Guild,
}

impl ModifierKind {
    pub fn phase(&self) -> Phase {
        match self {
            ModifierKind::OutcomeFlip => Phase::Outcome,
            ModifierKind::PayoutMultiplier(_)
            | ModifierKind::DoubleOrNothing
            | ModifierKind::FlatBonus(_)
            | ModifierKind::PayoutReduction(_) => Phase::Win,
            ModifierKind::SubscribedTeamRefund
            | ModifierKind::PartialRefund(_)
            | ModifierKind::FullRefund => Phase::Loss,
            ModifierKind::Siphon { .. }
            | ModifierKind::SelfDiversion { .. }
            | ModifierKind::GuildDiversion { .. }
            | ModifierKind::Copy { .. }
            | ModifierKind::CounterWager { .. } => Phase::Guild,
        }
    }
}

/// When a held card is used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// Whenever the card is checked, even if it changes nothing.
    OnCheck,
    /// Only when it actually changes the result.
    OnEffect,
    /// Time-boxed; removed by the expiry sweep.
    Never,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifierDescriptor {
    pub card: &'static str,
    pub name: &'static str,
    pub kind: ModifierKind,
    pub consumption: Consumption,
    /// How long after acquisition the card stays live.
    pub window: Option<Duration>,
}

impl ModifierDescriptor {
    pub fn new(
        card: &'static str,
        name: &'static str,
        kind: ModifierKind,
        consumption: Consumption,
    ) -> Self {
        Self {
            card,
            name,
            kind,
            consumption,
            window: None,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModifierRegistry {
    cards: HashMap<&'static str, ModifierDescriptor>,
}

impl ModifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog the game ships with.
    pub fn standard() -> Self {
        use Consumption::*;
        use ModifierKind::*;

        let mut registry = Self::new();
        for descriptor in [
            ModifierDescriptor::new(UNO_REVERSE, "Uno Reverse", OutcomeFlip, OnEffect),
            ModifierDescriptor::new(DOUBLE_DOWN, "Double Down", PayoutMultiplier(2.0), OnEffect),
            ModifierDescriptor::new(GAMBLER, "Gambler", DoubleOrNothing, OnCheck),
            ModifierDescriptor::new(HOT_STREAK, "Hot Streak", FlatBonus(50.0), OnEffect),
            ModifierDescriptor::new(HEX, "Hex", PayoutReduction(0.15), OnEffect),
            ModifierDescriptor::new(THE_TOWER, "The Tower", PayoutReduction(0.25), OnEffect),
            ModifierDescriptor::new(LOYAL_FAN, "Loyal Fan", SubscribedTeamRefund, OnCheck),
            ModifierDescriptor::new(BET_INSURANCE, "Bet Insurance", PartialRefund(0.5), OnEffect),
            ModifierDescriptor::new(GET_OUT_OF_JAIL, "Get Out Of Jail", FullRefund, OnEffect),
            ModifierDescriptor::new(
                VAMPIRE,
                "Vampire",
                Siphon {
                    rate: 0.05,
                    cap: 250.0,
                },
                Never,
            )
            .with_window(Duration::hours(24)),
            ModifierDescriptor::new(THE_DEVIL, "The Devil", SelfDiversion { rate: 0.20 }, Never)
                .with_window(Duration::days(7)),
            ModifierDescriptor::new(
                THE_EMPEROR,
                "The Emperor",
                GuildDiversion { rate: 0.10 },
                Never,
            ),
            ModifierDescriptor::new(
                THE_LOVERS,
                "The Lovers",
                ModifierKind::Copy { rate: 0.25 },
                Never,
            )
            .with_window(Duration::hours(24)),
            ModifierDescriptor::new(
                ANTI_ANTI_BET,
                "Anti-Anti-Bet",
                CounterWager { multiplier: 2.0 },
                OnCheck,
            ),
        ] {
            registry.register(descriptor);
        }
        registry
    }

    pub fn register(&mut self, descriptor: ModifierDescriptor) {
        self.cards.insert(descriptor.card, descriptor);
    }

    pub fn get(&self, card: &str) -> Option<&ModifierDescriptor> {
        self.cards.get(card)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
