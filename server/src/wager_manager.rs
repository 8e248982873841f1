use chrono::Utc;
use common::{Guild, SettleOutcome, Wager};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::database_manager::{ask, DatabaseRequest, Responder};
use crate::error::SettleError;
use crate::feed::GameFeed;
use crate::modifiers::pipeline::{CoinFlip, RandomCoin};
use crate::modifiers::ModifierRegistry;
use crate::notifier::{compose, Notifier};
use crate::settlement::{plan_settlement, Bettor, Planned, SettlementInput};

/// A commit rejected because a card was spent elsewhere is planned again once.
const COMMIT_ATTEMPTS: usize = 2;

pub enum WagerRequest {
    /// Settle from the feed's final score.
    SettleWager {
        wager_id: String,
        responder: Responder<SettleOutcome>,
    },
    /// Settle with a margin supplied by the caller.
    SettleWithScore {
        wager_id: String,
        score_diff: i64,
        responder: Responder<SettleOutcome>,
    },
    SettleDue {
        responder: Responder<SweepReport>,
    },
}

/// What one pass over the unpaid wagers did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub settled: Vec<String>,
    pub not_ready: usize,
    pub failed: Vec<String>,
}

pub struct WagerManager<F: GameFeed> {
    work_queue: mpsc::Receiver<WagerRequest>,
    database_requester: mpsc::Sender<DatabaseRequest>,
    feed: F,
    registry: Arc<ModifierRegistry>,
    coin: Box<dyn CoinFlip>,
    notifier: Notifier,
}

//NOTE: No functions in this impl may crash
impl<F: GameFeed> WagerManager<F> {
    pub fn new(
        work_queue: mpsc::Receiver<WagerRequest>,
        database_requester: mpsc::Sender<DatabaseRequest>,
        feed: F,
        registry: Arc<ModifierRegistry>,
        notifier: Notifier,
    ) -> Self {
        Self {
            work_queue,
            database_requester,
            feed,
            registry,
            coin: Box::new(RandomCoin),
            notifier,
        }
    }

    pub fn with_coin(mut self, coin: impl CoinFlip + 'static) -> Self {
        self.coin = Box::new(coin);
        self
    }

    pub async fn manage(&mut self) {
        while let Some(request) = self.work_queue.recv().await {
            match request {
                WagerRequest::SettleWager {
                    wager_id,
                    responder,
                } => {
                    // we do not care if the receiver has already disappeared
                    responder.send(self.settle_wager(&wager_id).await).ok();
                }
                WagerRequest::SettleWithScore {
                    wager_id,
                    score_diff,
                    responder,
                } => {
                    responder
                        .send(self.settle_wager_with_score(&wager_id, score_diff).await)
                        .ok();
                }
                WagerRequest::SettleDue { responder } => {
                    responder.send(self.settle_due().await).ok();
                }
            }
        }
    }

    async fn load_wager(&self, wager_id: &str) -> anyhow::Result<Wager> {
        let wager = ask(&self.database_requester, |responder| DatabaseRequest::GetWager {
            id: wager_id.to_string(),
            responder,
        })
        .await?;
        Ok(wager.ok_or_else(|| SettleError::WagerNotFound(wager_id.to_string()))?)
    }

    pub async fn settle_wager(&mut self, wager_id: &str) -> anyhow::Result<SettleOutcome> {
        let wager = self.load_wager(wager_id).await?;
        if wager.paid {
            info!(wager = %wager.id, "already paid");
            return Ok(SettleOutcome::AlreadyPaid);
        }
        let Some(game_id) = wager.game_id.as_deref() else {
            warn!(wager = %wager.id, "no game attached, nothing to settle from");
            return Ok(SettleOutcome::NotReady);
        };

        let result = self.feed.game_result(game_id).await?;
        let Some(score_diff) = result.and_then(|game| game.final_score_diff(wager.option1_side))
        else {
            debug!(wager = %wager.id, game = game_id, "game not final yet");
            return Ok(SettleOutcome::NotReady);
        };

        self.settle_loaded(wager, score_diff).await
    }

    pub async fn settle_wager_with_score(
        &mut self,
        wager_id: &str,
        score_diff: i64,
    ) -> anyhow::Result<SettleOutcome> {
        let wager = self.load_wager(wager_id).await?;
        if wager.paid {
            info!(wager = %wager.id, "already paid");
            return Ok(SettleOutcome::AlreadyPaid);
        }
        self.settle_loaded(wager, score_diff).await
    }

    async fn load_bettor(&self, user: &str) -> Result<Bettor, SettleError> {
        let bettor = ask(&self.database_requester, |responder| DatabaseRequest::GetBettor {
            user: user.to_string(),
            responder,
        })
        .await;
        match bettor {
            Ok(Some(bettor)) => Ok(bettor),
            Ok(None) => Err(SettleError::ModifierLookup {
                user: user.to_string(),
                reason: "no such user".into(),
            }),
            Err(err) => Err(SettleError::BettorUnavailable {
                user: user.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    async fn plan(&self, wager: &Wager, score_diff: i64) -> anyhow::Result<(Guild, Planned)> {
        let db = &self.database_requester;
        let guild = ask(db, |responder| DatabaseRequest::GetGuild {
            id: wager.guild.clone(),
            responder,
        })
        .await?
        .ok_or_else(|| SettleError::GuildNotFound(wager.guild.clone()))?;
        let entries = ask(db, |responder| DatabaseRequest::GetEntries {
            wager: wager.id.clone(),
            responder,
        })
        .await?;
        let guild_cards = ask(db, |responder| DatabaseRequest::GetGuildModifiers {
            guild: guild.id.clone(),
            responder,
        })
        .await?;
        let parlays = ask(db, |responder| DatabaseRequest::GetParlays {
            wager: wager.id.clone(),
            responder,
        })
        .await?;

        let mut bettors = HashMap::new();
        for entry in &entries {
            if !bettors.contains_key(&entry.user) {
                let bettor = self.load_bettor(&entry.user).await;
                bettors.insert(entry.user.clone(), bettor);
            }
        }

        let planned = plan_settlement(
            &self.registry,
            &*self.coin,
            SettlementInput {
                wager,
                guild: &guild,
                entries: &entries,
                bettors: &bettors,
                guild_cards: &guild_cards,
                parlays: &parlays,
                score_diff,
                now: Utc::now(),
            },
        );
        Ok((guild, planned))
    }

    async fn settle_loaded(
        &mut self,
        wager: Wager,
        score_diff: i64,
    ) -> anyhow::Result<SettleOutcome> {
        let mut attempt = 1;
        let (guild, planned) = loop {
            let (guild, planned) = self.plan(&wager, score_diff).await?;
            let committed = ask(&self.database_requester, |responder| {
                DatabaseRequest::CommitLedger {
                    plan: planned.plan.clone(),
                    responder,
                }
            })
            .await;
            let Err(err) = committed else {
                break (guild, planned);
            };

            // a concurrent invocation may have paid it between our read and the commit
            if let Ok(current) = self.load_wager(&wager.id).await {
                if current.paid {
                    info!(wager = %wager.id, "paid by a concurrent settlement");
                    return Ok(SettleOutcome::AlreadyPaid);
                }
            }
            if attempt < COMMIT_ATTEMPTS {
                warn!(
                    wager = %wager.id,
                    error = %err,
                    attempt,
                    "ledger commit rejected, planning again"
                );
                attempt += 1;
                continue;
            }
            error!(wager = %wager.id, error = %err, "ledger commit failed");
            return Err(err);
        };

        for (entry, err) in planned.stranded() {
            error!(
                wager = %wager.id,
                entry = %entry,
                error = %err,
                "entry left unresolved on a paid wager, needs a manual payout"
            );
        }

        let pool_balance = ask(&self.database_requester, |responder| DatabaseRequest::GetGuild {
            id: guild.id.clone(),
            responder,
        })
        .await?
        .map(|guild| guild.pool)
        .unwrap_or(guild.pool + planned.plan.pool_delta);

        let notice = compose(&wager, &planned, pool_balance);
        info!(
            wager = %wager.id,
            entries = notice.lines.len(),
            skipped = notice.skipped.len(),
            total_payout = notice.total_payout,
            pool = pool_balance,
            "wager settled"
        );
        self.notifier.publish(&notice);
        Ok(SettleOutcome::Settled(notice))
    }

    /// Tries every unpaid wager that has a game. One failure does not stop the rest.
    pub async fn settle_due(&mut self) -> anyhow::Result<SweepReport> {
        let wagers = ask(&self.database_requester, |responder| {
            DatabaseRequest::GetDueWagers { responder }
        })
        .await?;

        let mut report = SweepReport::default();
        for wager in wagers {
            match self.settle_wager(&wager.id).await {
                Ok(SettleOutcome::Settled(_)) => report.settled.push(wager.id),
                Ok(SettleOutcome::NotReady) => report.not_ready += 1,
                Ok(SettleOutcome::AlreadyPaid) => {}
                Err(err) => {
                    error!(wager = %wager.id, error = %err, "settlement failed");
                    report.failed.push(wager.id);
                }
            }
        }
        Ok(report)
    }
}
