use chrono::{DateTime, Utc};
use surrealdb::Connection;
use tokio::sync::{mpsc, oneshot};

use crate::database::DatabaseConnection;
use crate::ledger::LedgerPlan;
use crate::settlement::Bettor;

pub type Responder<T> = oneshot::Sender<anyhow::Result<T>>;

pub enum DatabaseRequest {
    GetUser {
        id: String,
        responder: Responder<Option<common::User>>,
    },
    GetGuild {
        id: String,
        responder: Responder<Option<common::Guild>>,
    },
    GetWager {
        id: String,
        responder: Responder<Option<common::Wager>>,
    },
    GetDueWagers {
        responder: Responder<Vec<common::Wager>>,
    },
    GetEntries {
        wager: String,
        responder: Responder<Vec<common::WagerEntry>>,
    },
    GetBettor {
        user: String,
        responder: Responder<Option<Bettor>>,
    },
    GetGuildModifiers {
        guild: String,
        responder: Responder<Vec<common::ModifierItem>>,
    },
    GetParlays {
        wager: String,
        responder: Responder<Vec<(common::Parlay, Vec<common::ParlayLeg>)>>,
    },
    CommitLedger {
        plan: LedgerPlan,
        responder: Responder<()>,
    },
    SweepExpired {
        now: DateTime<Utc>,
        responder: Responder<usize>,
    },
}

/// Sends a request built around a fresh responder and waits for the answer.
pub async fn ask<R, T>(
    queue: &mpsc::Sender<R>,
    build: impl FnOnce(Responder<T>) -> R,
) -> anyhow::Result<T> {
    let (tx, rx) = oneshot::channel();
    queue
        .send(build(tx))
        .await
        .map_err(|_| anyhow::Error::msg("request queue closed"))?;
    rx.await?
}

pub struct DatabaseManager<Conn: Connection> {
    db_connection: DatabaseConnection<Conn>,
    work_queue: mpsc::Receiver<DatabaseRequest>,
}

pub fn transform_err<T>(error: surrealdb::Result<T>) -> anyhow::Result<T> {
    error.map_err(anyhow::Error::from)
}

impl<Conn: Connection> DatabaseManager<Conn> {
    pub fn new(
        db_connection: DatabaseConnection<Conn>,
        work_queue: mpsc::Receiver<DatabaseRequest>,
    ) -> Self {
        Self {
            db_connection,
            work_queue,
        }
    }

    pub async fn manage(&mut self) {
        while let Some(request) = self.work_queue.recv().await {
            match request {
                DatabaseRequest::GetUser { id, responder } => {
                    let resp = transform_err(self.db_connection.get_user(&id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetGuild { id, responder } => {
                    let resp = transform_err(self.db_connection.get_guild(&id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetWager { id, responder } => {
                    let resp = transform_err(self.db_connection.get_wager(&id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetDueWagers { responder } => {
                    let resp = transform_err(self.db_connection.get_due_wagers().await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetEntries { wager, responder } => {
                    let resp =
                        transform_err(self.db_connection.get_entries_for_wager(&wager).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetBettor { user, responder } => {
                    let resp = transform_err(self.db_connection.get_bettor(&user).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetGuildModifiers { guild, responder } => {
                    let resp =
                        transform_err(self.db_connection.get_modifiers_for_guild(&guild).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetParlays { wager, responder } => {
                    let resp =
                        transform_err(self.db_connection.get_parlays_for_wager(&wager).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::CommitLedger { plan, responder } => {
                    let resp = self.db_connection.commit_ledger(&plan).await;
                    let _ = responder.send(transform_err(resp));
                }
                DatabaseRequest::SweepExpired { now, responder } => {
                    let resp = self.db_connection.sweep_expired_modifiers(now).await;
                    let _ = responder.send(transform_err(resp));
                }
            }
        }
    }
}
