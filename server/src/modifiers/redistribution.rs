//! Effects that look at every winner of a wager at once.
//!
//! Runs after each entry has been through its bettor pipeline. Rows apply in
//! a fixed order: siphon, self diversion, guild diversion, copy, counter-wager.
//! Siphon and copy are computed from pre-diversion winnings; each diversion
//! takes its cut of whatever the previous diversion left.

use chrono::{DateTime, Utc};
use common::{Guild, ModifierItem};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::*;
use crate::ledger::LedgerPlan;

#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub user: String,
    pub card: &'static str,
    /// Positive is credited to `user`; negative was diverted away from them.
    pub amount: f64,
}

pub struct GuildContext<'a> {
    pub guild: &'a Guild,
    /// Pre-diversion winnings per winning user.
    pub winners: &'a BTreeMap<String, f64>,
    /// Whether each bettor's first settled entry in this wager won.
    pub results: &'a BTreeMap<String, bool>,
    pub cards: &'a [ModifierItem],
    pub now: DateTime<Utc>,
}

/// Live copies of `card`, at most one per owner and target.
fn live<'c>(
    ctx: &GuildContext<'c>,
    descriptor: &ModifierDescriptor,
    plan: &LedgerPlan,
) -> Vec<&'c ModifierItem> {
    let mut seen = BTreeSet::new();
    let mut items = vec![];
    for item in ctx.cards {
        let live = item.card == descriptor.card
            && item.guild == ctx.guild.id
            && !item.is_expired(ctx.now)
            && !plan.is_consumed(&item.id)
            && descriptor
                .window
                .map_or(true, |window| item.acquired_within(ctx.now, window));
        if live && seen.insert((item.owner.clone(), item.target_user.clone())) {
            items.push(item);
        }
    }
    items
}

pub fn redistribute(
    registry: &ModifierRegistry,
    ctx: &GuildContext,
    plan: &mut LedgerPlan,
) -> Vec<Adjustment> {
    let mut adjustments = vec![];
    let mut remaining = ctx.winners.clone();
    let mut record = |user: &str, card: &'static str, amount: f64| {
        debug!(guild = %ctx.guild.id, user, card, amount, "guild modifier");
        adjustments.push(Adjustment {
            user: user.to_string(),
            card,
            amount,
        });
    };

    if let Some(descriptor) = registry.get(VAMPIRE) {
        if let ModifierKind::Siphon { rate, cap } = descriptor.kind {
            for item in live(ctx, descriptor, plan) {
                let others: f64 = ctx
                    .winners
                    .iter()
                    .filter(|(user, _)| **user != item.owner)
                    .map(|(_, winnings)| winnings)
                    .sum();
                let amount = (others * rate).min(cap);
                if amount > 0.0 {
                    plan.credit(&item.owner, amount);
                    record(&item.owner, descriptor.name, amount);
                }
            }
        }
    }

    if let Some(descriptor) = registry.get(THE_DEVIL) {
        if let ModifierKind::SelfDiversion { rate } = descriptor.kind {
            for item in live(ctx, descriptor, plan) {
                if let Some(winnings) = remaining.get_mut(&item.owner) {
                    let diverted = *winnings * rate;
                    *winnings -= diverted;
                    plan.divert(&item.owner, diverted);
                    record(&item.owner, descriptor.name, -diverted);
                }
            }
        }
    }

    if let (Some(descriptor), Some(emperor)) =
        (registry.get(THE_EMPEROR), ctx.guild.emperor_at(ctx.now))
    {
        if let ModifierKind::GuildDiversion { rate } = descriptor.kind {
            for (user, winnings) in remaining.iter_mut().filter(|(user, _)| *user != emperor) {
                let diverted = *winnings * rate;
                *winnings -= diverted;
                plan.divert(user, diverted);
                record(user, descriptor.name, -diverted);
            }
        }
    }

    if let Some(descriptor) = registry.get(THE_LOVERS) {
        if let ModifierKind::Copy { rate } = descriptor.kind {
            for item in live(ctx, descriptor, plan) {
                let Some(target) = item.target_user.as_deref() else {
                    continue;
                };
                if target == item.owner {
                    continue;
                }
                if let Some(winnings) = ctx.winners.get(target) {
                    let amount = winnings * rate;
                    plan.credit(&item.owner, amount);
                    record(&item.owner, descriptor.name, amount);
                }
            }
        }
    }

    if let Some(descriptor) = registry.get(ANTI_ANTI_BET) {
        if let ModifierKind::CounterWager { multiplier } = descriptor.kind {
            for item in live(ctx, descriptor, plan) {
                let (Some(target), Some(side_stake)) =
                    (item.target_user.as_deref(), item.side_stake)
                else {
                    continue;
                };
                match ctx.results.get(target) {
                    Some(false) => {
                        let amount = side_stake * multiplier;
                        plan.credit(&item.owner, amount);
                        record(&item.owner, descriptor.name, amount);
                    }
                    Some(true) => {
                        plan.credit(target, side_stake);
                        record(target, descriptor.name, side_stake);
                    }
                    // target sat this one out; the side-bet waits for their next wager
                    None => continue,
                }
                plan.consume(item);
            }
        }
    }

    adjustments
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn card(id: &str, owner: &str, card: &str, age: Duration) -> ModifierItem {
        ModifierItem::new(id, owner, "g", card, Utc::now() - age)
    }

    fn winners(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(u, w)| (u.to_string(), *w)).collect()
    }

    fn run(
        guild: &Guild,
        winners: &BTreeMap<String, f64>,
        results: &BTreeMap<String, bool>,
        cards: &[ModifierItem],
    ) -> (LedgerPlan, Vec<Adjustment>) {
        let mut plan = LedgerPlan::new("w1", "g");
        for (user, winnings) in winners {
            plan.credit(user, *winnings);
        }
        let ctx = GuildContext {
            guild,
            winners,
            results,
            cards,
            now: Utc::now(),
        };
        let adjustments = redistribute(&ModifierRegistry::standard(), &ctx, &mut plan);
        (plan, adjustments)
    }

    #[test]
    fn devil_diverts_a_fifth_to_the_pool() {
        let guild = Guild::new("g", 0.0);
        let winners = winners(&[("alice", 500.0), ("bob", 100.0)]);
        let cards = [card("d", "alice", THE_DEVIL, Duration::days(2))];
        let (plan, adjustments) = run(&guild, &winners, &BTreeMap::new(), &cards);
        assert!(close(plan.user_delta("alice"), 400.0));
        assert!(close(plan.user_delta("bob"), 100.0));
        assert!(close(plan.pool_delta, 100.0));
        assert_eq!(adjustments.len(), 1);
    }

    #[test]
    fn devil_outside_its_week_does_nothing() {
        let guild = Guild::new("g", 0.0);
        let winners = winners(&[("alice", 500.0)]);
        let cards = [card("d", "alice", THE_DEVIL, Duration::days(8))];
        let (plan, adjustments) = run(&guild, &winners, &BTreeMap::new(), &cards);
        assert!(close(plan.user_delta("alice"), 500.0));
        assert_eq!(plan.pool_delta, 0.0);
        assert!(adjustments.is_empty());
    }

    #[test]
    fn vampire_takes_from_everyone_else_up_to_the_cap() {
        let guild = Guild::new("g", 0.0);
        let cards = [card("v", "alice", VAMPIRE, Duration::hours(3))];

        let small = winners(&[("alice", 1000.0), ("bob", 200.0), ("carol", 300.0)]);
        let (plan, _) = run(&guild, &small, &BTreeMap::new(), &cards);
        assert!(close(plan.user_delta("alice"), 1000.0 + 25.0));
        assert!(close(plan.user_delta("bob"), 200.0));
        assert_eq!(plan.pool_delta, 0.0);

        let large = winners(&[("bob", 10_000.0)]);
        let (plan, _) = run(&guild, &large, &BTreeMap::new(), &cards);
        assert!(close(plan.user_delta("alice"), 250.0));
    }

    #[test]
    fn stale_vampire_is_ignored() {
        let guild = Guild::new("g", 0.0);
        let cards = [card("v", "alice", VAMPIRE, Duration::hours(25))];
        let (plan, _) = run(&guild, &winners(&[("bob", 200.0)]), &BTreeMap::new(), &cards);
        assert_eq!(plan.user_delta("alice"), 0.0);
    }

    #[test]
    fn emperor_spares_the_holder() {
        let mut guild = Guild::new("g", 0.0);
        guild.emperor = Some("alice".into());
        guild.emperor_until = Some(Utc::now() + Duration::hours(1));
        let winners = winners(&[("alice", 300.0), ("bob", 200.0)]);
        let (plan, _) = run(&guild, &winners, &BTreeMap::new(), &[]);
        assert!(close(plan.user_delta("alice"), 300.0));
        assert!(close(plan.user_delta("bob"), 180.0));
        assert!(close(plan.pool_delta, 20.0));
    }

    #[test]
    fn emperor_window_closed() {
        let mut guild = Guild::new("g", 0.0);
        guild.emperor = Some("alice".into());
        guild.emperor_until = Some(Utc::now() - Duration::hours(1));
        let (plan, _) = run(&guild, &winners(&[("bob", 200.0)]), &BTreeMap::new(), &[]);
        assert_eq!(plan.pool_delta, 0.0);
    }

    #[test]
    fn diversions_stack_on_what_is_left() {
        let mut guild = Guild::new("g", 0.0);
        guild.emperor = Some("carol".into());
        guild.emperor_until = Some(Utc::now() + Duration::hours(1));
        let cards = [card("d", "bob", THE_DEVIL, Duration::hours(1))];
        let (plan, _) = run(&guild, &winners(&[("bob", 100.0)]), &BTreeMap::new(), &cards);
        assert!(close(plan.user_delta("bob"), 100.0 * 0.8 * 0.9));
        assert!(close(plan.pool_delta, 20.0 + 8.0));
    }

    #[test]
    fn lovers_copy_pre_diversion_winnings() {
        let guild = Guild::new("g", 0.0);
        let mut lovers = card("l", "alice", THE_LOVERS, Duration::hours(1));
        lovers.target_user = Some("bob".into());
        lovers.expires_at = Some(Utc::now() + Duration::hours(23));
        let devil = card("d", "bob", THE_DEVIL, Duration::hours(1));
        let (plan, _) = run(
            &guild,
            &winners(&[("bob", 400.0)]),
            &BTreeMap::new(),
            &[lovers, devil],
        );
        assert!(close(plan.user_delta("alice"), 100.0));
        assert!(close(plan.user_delta("bob"), 320.0));
    }

    #[test]
    fn lovers_need_the_target_to_win() {
        let guild = Guild::new("g", 0.0);
        let mut lovers = card("l", "alice", THE_LOVERS, Duration::hours(1));
        lovers.target_user = Some("bob".into());
        let winners = winners(&[("carol", 400.0)]);
        let (plan, adjustments) = run(&guild, &winners, &BTreeMap::new(), &[lovers]);
        assert_eq!(plan.user_delta("alice"), 0.0);
        assert!(adjustments.is_empty());
    }

    #[test]
    fn lovers_lapse_a_day_after_acquisition() {
        let guild = Guild::new("g", 0.0);
        let mut stale = card("l", "alice", THE_LOVERS, Duration::hours(25));
        stale.target_user = Some("bob".into());
        assert!(stale.expires_at.is_none());
        let winners = winners(&[("bob", 400.0)]);
        let (plan, adjustments) = run(&guild, &winners, &BTreeMap::new(), &[stale]);
        assert_eq!(plan.user_delta("alice"), 0.0);
        assert!(close(plan.user_delta("bob"), 400.0));
        assert!(adjustments.is_empty());
    }

    #[test]
    fn counter_wager_pays_double_when_the_target_loses() {
        let guild = Guild::new("g", 0.0);
        let mut side_bet = card("a", "alice", ANTI_ANTI_BET, Duration::hours(1));
        side_bet.target_user = Some("bob".into());
        side_bet.side_stake = Some(40.0);
        let results = BTreeMap::from([("bob".to_string(), false)]);
        let (plan, _) = run(&guild, &BTreeMap::new(), &results, &[side_bet]);
        assert!(close(plan.user_delta("alice"), 80.0));
        assert!(plan.is_consumed("a"));
    }

    #[test]
    fn counter_wager_forfeits_to_a_winning_target() {
        let guild = Guild::new("g", 0.0);
        let mut side_bet = card("a", "alice", ANTI_ANTI_BET, Duration::hours(1));
        side_bet.target_user = Some("bob".into());
        side_bet.side_stake = Some(40.0);
        let results = BTreeMap::from([("bob".to_string(), true)]);
        let (plan, _) = run(&guild, &winners(&[("bob", 100.0)]), &results, &[side_bet]);
        assert!(close(plan.user_delta("bob"), 140.0));
        assert_eq!(plan.user_delta("alice"), 0.0);
        assert!(plan.is_consumed("a"));
    }

    #[test]
    fn counter_wager_waits_for_the_target() {
        let guild = Guild::new("g", 0.0);
        let mut side_bet = card("a", "alice", ANTI_ANTI_BET, Duration::hours(1));
        side_bet.target_user = Some("bob".into());
        side_bet.side_stake = Some(40.0);
        let (plan, _) = run(&guild, &BTreeMap::new(), &BTreeMap::new(), &[side_bet]);
        assert!(plan.consumed.is_empty());
    }
}
