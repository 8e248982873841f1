#![allow(dead_code)]

use bookie::connection_manager::Services;
use bookie::database::DatabaseConnection;
use bookie::database_manager::{ask, DatabaseManager, DatabaseRequest};
use bookie::feed::ScoreBoard;
use bookie::modifiers::pipeline::CoinFlip;
use bookie::modifiers::ModifierRegistry;
use bookie::notifier::Notifier;
use bookie::wager_manager::{WagerManager, WagerRequest};
use chrono::{Duration, Utc};
use common::{
    GameSide, Guild, ModifierItem, SettleOutcome, SettlementNotice, User, Wager, WagerEntry,
};
use std::sync::Arc;
use surrealdb::engine::local::Db;
use tokio::sync::mpsc;

pub struct Heads(pub bool);

impl CoinFlip for Heads {
    fn heads(&self) -> bool {
        self.0
    }
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

pub fn wager(id: &str, spread: Option<f64>) -> Wager {
    Wager {
        id: id.into(),
        guild: "g".into(),
        title: "Bills vs Chiefs".into(),
        option1: "Bills".into(),
        option2: "Chiefs".into(),
        option1_odds: -110,
        option2_odds: -110,
        spread,
        game_id: None,
        option1_side: GameSide::Home,
        active: true,
        paid: false,
    }
}

pub fn game_wager(id: &str, game_id: &str) -> Wager {
    Wager {
        game_id: Some(game_id.into()),
        ..wager(id, None)
    }
}

pub fn entry(id: &str, wager: &str, user: &str, option: u8, stake: f64) -> WagerEntry {
    WagerEntry {
        id: id.into(),
        wager: wager.into(),
        user: user.into(),
        option,
        stake,
        spread: None,
        placed_at: Utc::now(),
        resolved: false,
        won: false,
    }
}

pub fn card(id: &str, owner: &str, card: &str) -> ModifierItem {
    ModifierItem::new(id, owner, "g", card, Utc::now() - Duration::hours(1))
}

/// A guild `g` with 1000 in the pool and two members holding 1000 each.
pub async fn seeded() -> DatabaseConnection<Db> {
    let mut db = DatabaseConnection::in_memory().await.unwrap();
    db.add_guild(&Guild::new("g", 1000.0)).await.unwrap();
    db.add_user(&User::new("alice", "g", 1000.0)).await.unwrap();
    db.add_user(&User::new("bob", "g", 1000.0)).await.unwrap();
    db
}

pub fn settled(outcome: SettleOutcome) -> SettlementNotice {
    match outcome {
        SettleOutcome::Settled(notice) => notice,
        other => panic!("expected a settlement, got {other:?}"),
    }
}

pub struct Harness {
    pub db_tx: mpsc::Sender<DatabaseRequest>,
    pub wager_tx: mpsc::Sender<WagerRequest>,
    pub scoreboard: ScoreBoard,
    pub notifier: Notifier,
}

impl Harness {
    pub async fn start(db: DatabaseConnection<Db>) -> Self {
        Self::start_with(db, ModifierRegistry::standard(), true).await
    }

    /// A harness whose worker uses `registry` and always lands the coin on `heads`.
    pub async fn start_with(
        db: DatabaseConnection<Db>,
        registry: ModifierRegistry,
        heads: bool,
    ) -> Self {
        let (db_tx, db_rx) = mpsc::channel(32);
        let mut db_manager = DatabaseManager::new(db, db_rx);
        tokio::spawn(async move {
            db_manager.manage().await;
        });

        let scoreboard = ScoreBoard::new();
        let notifier = Notifier::new(16);
        let wager_tx = Self::spawn_worker(&db_tx, &scoreboard, &notifier, registry, heads);

        Self {
            db_tx,
            wager_tx,
            scoreboard,
            notifier,
        }
    }

    /// Another settlement worker on the same database queue.
    pub fn spawn_wager_manager(
        db_tx: &mpsc::Sender<DatabaseRequest>,
        scoreboard: &ScoreBoard,
        notifier: &Notifier,
    ) -> mpsc::Sender<WagerRequest> {
        Self::spawn_worker(db_tx, scoreboard, notifier, ModifierRegistry::standard(), true)
    }

    fn spawn_worker(
        db_tx: &mpsc::Sender<DatabaseRequest>,
        scoreboard: &ScoreBoard,
        notifier: &Notifier,
        registry: ModifierRegistry,
        heads: bool,
    ) -> mpsc::Sender<WagerRequest> {
        let (wager_tx, wager_rx) = mpsc::channel(32);
        let mut wager_manager = WagerManager::new(
            wager_rx,
            db_tx.clone(),
            scoreboard.clone(),
            Arc::new(registry),
            notifier.clone(),
        )
        .with_coin(Heads(heads));
        tokio::spawn(async move {
            wager_manager.manage().await;
        });
        wager_tx
    }

    pub fn services(&self) -> Services {
        Services {
            db_tx: self.db_tx.clone(),
            wager_tx: self.wager_tx.clone(),
            scoreboard: self.scoreboard.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub async fn settle(&self, wager_id: &str) -> anyhow::Result<SettleOutcome> {
        ask(&self.wager_tx, |responder| WagerRequest::SettleWager {
            wager_id: wager_id.into(),
            responder,
        })
        .await
    }

    pub async fn settle_with_score(&self, wager_id: &str, score_diff: i64) -> SettleOutcome {
        Self::settle_on(&self.wager_tx, wager_id, score_diff).await
    }

    /// Settles through a specific worker.
    pub async fn settle_on(
        worker: &mpsc::Sender<WagerRequest>,
        wager_id: &str,
        score_diff: i64,
    ) -> SettleOutcome {
        ask(worker, |responder| WagerRequest::SettleWithScore {
            wager_id: wager_id.into(),
            score_diff,
            responder,
        })
        .await
        .unwrap()
    }

    pub async fn points(&self, user: &str) -> f64 {
        ask(&self.db_tx, |responder| DatabaseRequest::GetUser {
            id: user.into(),
            responder,
        })
        .await
        .unwrap()
        .unwrap()
        .points
    }

    pub async fn pool(&self) -> f64 {
        ask(&self.db_tx, |responder| DatabaseRequest::GetGuild {
            id: "g".into(),
            responder,
        })
        .await
        .unwrap()
        .unwrap()
        .pool
    }

    pub async fn wager(&self, id: &str) -> Wager {
        ask(&self.db_tx, |responder| DatabaseRequest::GetWager {
            id: id.into(),
            responder,
        })
        .await
        .unwrap()
        .unwrap()
    }

    pub async fn entries(&self, wager: &str) -> Vec<WagerEntry> {
        let mut entries = ask(&self.db_tx, |responder| DatabaseRequest::GetEntries {
            wager: wager.into(),
            responder,
        })
        .await
        .unwrap();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub async fn inventory(&self, user: &str) -> Vec<ModifierItem> {
        ask(&self.db_tx, |responder| DatabaseRequest::GetBettor {
            user: user.into(),
            responder,
        })
        .await
        .unwrap()
        .unwrap()
        .inventory
    }
}
