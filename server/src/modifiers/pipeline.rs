use chrono::{DateTime, Utc};
use common::{odds, outcome, ModifierItem, User, Wager, WagerEntry};
use tracing::debug;

use super::*;
use crate::ledger::LedgerPlan;

/// Order in which a bettor's cards are checked. Each stage sees the running
/// result left by the ones before it.
pub const BETTOR_STAGES: [&str; 9] = [
    UNO_REVERSE,
    DOUBLE_DOWN,
    GAMBLER,
    HOT_STREAK,
    HEX,
    THE_TOWER,
    LOYAL_FAN,
    BET_INSURANCE,
    GET_OUT_OF_JAIL,
];

pub trait CoinFlip: Send + Sync {
    fn heads(&self) -> bool;
}

pub struct RandomCoin;

impl CoinFlip for RandomCoin {
    fn heads(&self) -> bool {
        rand::random()
    }
}

/// What one entry settles to once its cards have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct BettorResult {
    pub won: bool,
    pub stake: f64,
    /// Total return credited on a win.
    pub payout: f64,
    /// Part of a losing stake handed back.
    pub refund: f64,
    pub applied: Vec<&'static str>,
}

impl BettorResult {
    fn price(&mut self, ctx: &BettorContext) {
        self.payout = if self.won {
            odds::payout(self.stake, ctx.entry.option, ctx.wager).unwrap_or(0.0)
        } else {
            0.0
        };
    }

    fn unrefunded(&self) -> f64 {
        (self.stake - self.refund).max(0.0)
    }
}

pub struct BettorContext<'a> {
    pub wager: &'a Wager,
    pub entry: &'a WagerEntry,
    pub user: &'a User,
    pub score_diff: i64,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Unchanged,
    Changed,
}

impl ModifierKind {
    fn apply(&self, result: &mut BettorResult, ctx: &BettorContext, coin: &dyn CoinFlip) -> Effect {
        match *self {
            ModifierKind::OutcomeFlip => {
                result.won = !result.won;
            }
            ModifierKind::PayoutMultiplier(factor) => result.payout *= factor,
            ModifierKind::DoubleOrNothing => {
                if coin.heads() {
                    result.payout *= 2.0;
                } else {
                    // still a win, but nothing comes back, not even the stake
                    result.payout = 0.0;
                }
            }
            ModifierKind::FlatBonus(bonus) => result.payout += bonus,
            ModifierKind::PayoutReduction(fraction) => result.payout *= 1.0 - fraction,
            ModifierKind::SubscribedTeamRefund => {
                let picked = ctx.wager.option_name(ctx.entry.option);
                let other = 3 - ctx.entry.option;
                let lost_outright = outcome::entry_wins(other, ctx.score_diff, None);
                let own_team = picked.is_some() && ctx.user.subscribed_team.as_deref() == picked;
                if !(own_team && lost_outright) || result.unrefunded() == 0.0 {
                    return Effect::Unchanged;
                }
                result.refund += result.unrefunded();
            }
            ModifierKind::PartialRefund(fraction) => {
                if result.unrefunded() == 0.0 {
                    return Effect::Unchanged;
                }
                result.refund += result.unrefunded() * fraction;
            }
            ModifierKind::FullRefund => {
                if result.unrefunded() == 0.0 {
                    return Effect::Unchanged;
                }
                result.refund += result.unrefunded();
            }
            ModifierKind::Siphon { .. }
            | ModifierKind::SelfDiversion { .. }
            | ModifierKind::GuildDiversion { .. }
            | ModifierKind::Copy { .. }
            | ModifierKind::CounterWager { .. } => return Effect::Unchanged,
        }
        Effect::Changed
    }
}

fn usable<'i>(
    inventory: &'i [ModifierItem],
    descriptor: &ModifierDescriptor,
    ctx: &BettorContext,
    plan: &LedgerPlan,
) -> Option<&'i ModifierItem> {
    inventory.iter().find(|item| {
        item.card == descriptor.card
            && !item.is_expired(ctx.now)
            && !plan.is_consumed(&item.id)
            && descriptor
                .window
                .map_or(true, |window| item.acquired_within(ctx.now, window))
            && (descriptor.kind != ModifierKind::OutcomeFlip
                || item.target_wager.as_deref() == Some(ctx.wager.id.as_str()))
    })
}

/// Settles one entry and runs it through the bettor's cards, recording every
/// card it uses up in `plan`.
pub fn run_pipeline(
    registry: &ModifierRegistry,
    ctx: &BettorContext,
    inventory: &[ModifierItem],
    coin: &dyn CoinFlip,
    plan: &mut LedgerPlan,
) -> BettorResult {
    let spread = ctx.entry.effective_spread(ctx.wager);
    let mut result = BettorResult {
        won: outcome::entry_wins(ctx.entry.option, ctx.score_diff, spread),
        stake: ctx.entry.stake,
        payout: 0.0,
        refund: 0.0,
        applied: vec![],
    };
    let mut priced = false;

    for card in BETTOR_STAGES {
        let Some(descriptor) = registry.get(card) else {
            continue;
        };
        let phase = descriptor.kind.phase();
        if phase != Phase::Outcome && !priced {
            result.price(ctx);
            priced = true;
        }
        let live = match phase {
            Phase::Outcome => true,
            Phase::Win => result.won,
            Phase::Loss => !result.won,
            Phase::Guild => false,
        };
        if !live {
            continue;
        }
        let Some(item) = usable(inventory, descriptor, ctx, plan) else {
            continue;
        };

        let effect = descriptor.kind.apply(&mut result, ctx, coin);
        let consume = match descriptor.consumption {
            Consumption::OnCheck => true,
            Consumption::OnEffect => effect == Effect::Changed,
            Consumption::Never => false,
        };
        if consume {
            plan.consume(item);
        }
        if effect == Effect::Changed {
            result.applied.push(descriptor.name);
        }
        debug!(
            entry = %ctx.entry.id,
            card = descriptor.card,
            ?effect,
            consumed = consume,
            payout = result.payout,
            refund = result.refund,
            "applied modifier"
        );
    }

    if !priced {
        result.price(ctx);
    }
    result
}
