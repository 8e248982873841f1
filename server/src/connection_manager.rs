use anyhow::bail;
use common::network::{Connection, Packet, Request, Response};
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::database_manager::{ask, DatabaseRequest};
use crate::feed::{GameResult, ScoreBoard};
use crate::notifier::Notifier;
use crate::wager_manager::WagerRequest;

/// Everything a client connection can reach.
#[derive(Clone)]
pub struct Services {
    pub db_tx: mpsc::Sender<DatabaseRequest>,
    pub wager_tx: mpsc::Sender<WagerRequest>,
    pub scoreboard: ScoreBoard,
    pub notifier: Notifier,
}

pub async fn handle_listen_server(listener: TcpListener, services: Services) {
    loop {
        let (connection, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                error!(error = %err, "accept failed");
                continue;
            }
        };
        let services = services.clone();

        tokio::spawn(async move {
            let connection = match Connection::from_tcp_stream(connection).await {
                Ok(connection) => connection,
                Err(err) => {
                    warn!(%peer, error = %err, "websocket handshake failed");
                    return;
                }
            };
            debug!(%peer, "client connected");
            handle_connection(connection, services).await;
            debug!(%peer, "client gone");
        });
    }
}

async fn handle_connection(mut connection: Connection, services: Services) {
    if let Err(err) = handle_client(&mut connection, &services).await {
        warn!(error = %err, "closing connection");
        // the client may already be gone
        connection.send(Packet::Error).await.ok();
    }
}

async fn handle_client(connection: &mut Connection, services: &Services) -> anyhow::Result<()> {
    loop {
        let packet = connection.read().await;
        if let Ok(Packet::RequestPacket(request)) = packet {
            match request {
                Request::Subscribe => {
                    let notices = services.notifier.subscribe();
                    connection
                        .send(Packet::ResponsePacket(Response::Subscribed))
                        .await?;
                    return stream_notices(connection, notices).await;
                }
                Request::SettleWager { wager_id } => {
                    info!(wager = %wager_id, "manual settlement requested");
                    let result = ask(&services.wager_tx, |responder| WagerRequest::SettleWager {
                        wager_id,
                        responder,
                    })
                    .await;
                    match result {
                        Ok(outcome) => {
                            connection
                                .send(Packet::ResponsePacket(Response::Settlement(outcome)))
                                .await?
                        }
                        Err(err) => {
                            warn!(error = %err, "manual settlement failed");
                            connection.send(Packet::Error).await?
                        }
                    }
                }
                Request::ReportScore {
                    game_id,
                    home_score,
                    away_score,
                    completed,
                } => {
                    services
                        .scoreboard
                        .record(GameResult {
                            game_id,
                            home_score,
                            away_score,
                            completed,
                        })
                        .await;
                    connection
                        .send(Packet::ResponsePacket(Response::None))
                        .await?;
                }
                Request::PoolBalance { guild_id } => {
                    let guild = ask(&services.db_tx, |responder| DatabaseRequest::GetGuild {
                        id: guild_id,
                        responder,
                    })
                    .await;
                    if let Ok(Some(guild)) = guild {
                        connection
                            .send(Packet::ResponsePacket(Response::PoolBalance(guild.pool)))
                            .await?;
                    } else {
                        connection.send(Packet::Error).await?;
                    }
                }
            }
        } else {
            return match packet {
                Ok(pack) => bail!("incorrect packet type: {:?}", pack),
                Err(error) => {
                    let kind = error.downcast_ref::<std::io::Error>().map(|io| io.kind());
                    match kind {
                        //connection aborted is considered successful
                        Some(ErrorKind::ConnectionAborted) => Ok(()),
                        _ => Err(error),
                    }
                }
            };
        }
    }
}

/// Forwards notices until the client goes away.
async fn stream_notices(
    connection: &mut Connection,
    mut notices: broadcast::Receiver<common::SettlementNotice>,
) -> anyhow::Result<()> {
    loop {
        match notices.recv().await {
            Ok(notice) => connection.send(Packet::Notification(notice)).await?,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "subscriber fell behind, notices dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}
