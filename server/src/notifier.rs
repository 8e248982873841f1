use common::{EntryLine, SettlementNotice, Wager};
use tokio::sync::broadcast;
use tracing::warn;

use crate::settlement::Planned;

/// Fans settlement notices out to whoever is listening. Delivery is best
/// effort and never feeds back into settlement.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<SettlementNotice>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlementNotice> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notice: &SettlementNotice) {
        if self.sender.send(notice.clone()).is_err() {
            warn!(wager = %notice.wager_id, "no subscribers for settlement notice");
        }
    }
}

/// `Bills -3.5`, `Chiefs +3.5`, `Bills PK` or `Bills ML`.
pub fn spread_label(wager: &Wager, option: u8, spread: Option<f64>) -> String {
    let name = wager.option_name(option).unwrap_or("?");
    match spread {
        None => format!("{name} ML"),
        Some(spread) => {
            let line = if option == 1 { spread } else { -spread };
            if line == 0.0 {
                format!("{name} PK")
            } else {
                format!("{name} {line:+}")
            }
        }
    }
}

pub fn compose(wager: &Wager, planned: &Planned, pool_balance: f64) -> SettlementNotice {
    let lines = planned
        .outcomes
        .iter()
        .map(|outcome| {
            let entry = &outcome.entry;
            let result = &outcome.result;
            let label = spread_label(wager, entry.option, entry.effective_spread(wager));
            let mut text = if result.won {
                format!("✅ {} won {:.2} on {label}", outcome.user_name, result.payout)
            } else if result.refund > 0.0 {
                format!(
                    "❌ {} lost {:.2} on {label} ({:.2} refunded)",
                    outcome.user_name, result.stake, result.refund
                )
            } else {
                format!("❌ {} lost {:.2} on {label}", outcome.user_name, result.stake)
            };
            if !result.applied.is_empty() {
                text.push_str(&format!(" [{}]", result.applied.join(", ")));
            }
            EntryLine {
                user: entry.user.clone(),
                spread_label: label,
                won: result.won,
                stake: result.stake,
                payout: result.payout,
                refund: result.refund,
                modifiers: result.applied.iter().map(|name| name.to_string()).collect(),
                text,
            }
        })
        .collect();

    let adjustments = planned
        .adjustments
        .iter()
        .map(|adjustment| {
            if adjustment.amount < 0.0 {
                format!(
                    "{}: {:.2} of {}'s winnings went to the pool",
                    adjustment.card, -adjustment.amount, adjustment.user
                )
            } else {
                format!("{}: {} gained {:.2}", adjustment.card, adjustment.user, adjustment.amount)
            }
        })
        .collect();

    SettlementNotice {
        wager_id: wager.id.clone(),
        guild: wager.guild.clone(),
        title: wager.title.clone(),
        winning_option: planned
            .winning_option
            .and_then(|option| wager.option_name(option))
            .map(str::to_string),
        lines,
        adjustments,
        skipped: planned
            .skipped
            .iter()
            .map(|(entry, err)| format!("{entry}: {err}"))
            .collect(),
        total_payout: planned.total_payout(),
        pool_balance,
    }
}
