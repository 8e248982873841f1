//! Turns a final score and everything loaded for one wager into a
//! [`LedgerPlan`]. Nothing in here touches the database.

use chrono::{DateTime, Utc};
use common::{outcome, Guild, ModifierItem, Parlay, ParlayLeg, User, Wager, WagerEntry};
use std::collections::{BTreeMap, HashMap};
use tracing::error;

use crate::error::SettleError;
use crate::ledger::LedgerPlan;
use crate::modifiers::pipeline::{run_pipeline, BettorContext, BettorResult, CoinFlip};
use crate::modifiers::redistribution::{redistribute, Adjustment, GuildContext};
use crate::modifiers::ModifierRegistry;
use crate::parlay;

/// A user together with the cards they hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Bettor {
    pub user: User,
    pub inventory: Vec<ModifierItem>,
}

pub struct SettlementInput<'a> {
    pub wager: &'a Wager,
    pub guild: &'a Guild,
    pub entries: &'a [WagerEntry],
    pub bettors: &'a HashMap<String, Result<Bettor, SettleError>>,
    pub guild_cards: &'a [ModifierItem],
    pub parlays: &'a [(Parlay, Vec<ParlayLeg>)],
    pub score_diff: i64,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryOutcome {
    pub entry: WagerEntry,
    pub user_name: String,
    pub result: BettorResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Planned {
    pub plan: LedgerPlan,
    pub winning_option: Option<u8>,
    pub outcomes: Vec<EntryOutcome>,
    pub adjustments: Vec<Adjustment>,
    pub skipped: Vec<(String, SettleError)>,
}

impl Planned {
    pub fn total_payout(&self) -> f64 {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.won)
            .map(|outcome| outcome.result.payout)
            .sum()
    }

    /// Entries skipped because the store failed, not because of their data.
    /// They stay unresolved on a wager that is about to be marked paid.
    pub fn stranded(&self) -> impl Iterator<Item = &(String, SettleError)> {
        self.skipped.iter().filter(|(_, err)| err.is_transient())
    }
}

pub fn plan_settlement(
    registry: &ModifierRegistry,
    coin: &dyn CoinFlip,
    input: SettlementInput,
) -> Planned {
    let SettlementInput {
        wager,
        guild,
        entries,
        bettors,
        guild_cards,
        parlays,
        score_diff,
        now,
    } = input;

    let mut plan = LedgerPlan::new(&wager.id, &guild.id);
    let mut outcomes = vec![];
    let mut skipped = vec![];
    let mut winners = BTreeMap::new();
    let mut results = BTreeMap::new();

    let mut entries = entries.to_vec();
    entries.sort_by(|a, b| a.placed_at.cmp(&b.placed_at).then_with(|| a.id.cmp(&b.id)));

    for entry in &entries {
        if !(1..=2).contains(&entry.option) {
            let err = SettleError::InvalidOption {
                entry: entry.id.clone(),
                option: entry.option,
            };
            error!(wager = %wager.id, %err, "skipping entry");
            skipped.push((entry.id.clone(), err));
            continue;
        }
        let bettor = match bettors.get(&entry.user) {
            Some(Ok(bettor)) => bettor,
            Some(Err(err)) => {
                error!(wager = %wager.id, entry = %entry.id, %err, "skipping entry");
                skipped.push((entry.id.clone(), err.clone()));
                continue;
            }
            None => {
                let err = SettleError::ModifierLookup {
                    user: entry.user.clone(),
                    reason: "bettor was not loaded".into(),
                };
                error!(wager = %wager.id, entry = %entry.id, %err, "skipping entry");
                skipped.push((entry.id.clone(), err));
                continue;
            }
        };

        let ctx = BettorContext {
            wager,
            entry,
            user: &bettor.user,
            score_diff,
            now,
        };
        let result = run_pipeline(registry, &ctx, &bettor.inventory, coin, &mut plan);

        if result.won {
            plan.credit(&entry.user, result.payout);
            *winners.entry(entry.user.clone()).or_insert(0.0) += result.payout;
        } else {
            plan.to_pool(result.stake - result.refund);
            plan.credit(&entry.user, result.refund);
        }
        results.entry(entry.user.clone()).or_insert(result.won);
        plan.resolve_entry(&entry.id, result.won);
        outcomes.push(EntryOutcome {
            entry: entry.clone(),
            user_name: bettor.user.name.clone(),
            result,
        });
    }

    let guild_ctx = GuildContext {
        guild,
        winners: &winners,
        results: &results,
        cards: guild_cards,
        now,
    };
    let adjustments = redistribute(registry, &guild_ctx, &mut plan);

    let winning_option = outcome::determine_outcome(score_diff, wager.spread);
    parlay::propagate(&wager.id, winning_option, parlays, &mut plan);

    Planned {
        plan,
        winning_option,
        outcomes,
        adjustments,
        skipped,
    }
}
