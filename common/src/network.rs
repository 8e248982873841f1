use anyhow::bail;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{SettleOutcome, SettlementNotice};

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub enum Request {
    Subscribe, // Subscribed response, then a stream of Notification packets
    SettleWager { wager_id: String },
    ReportScore {
        game_id: String,
        home_score: Option<i64>,
        away_score: Option<i64>,
        completed: bool,
    }, // None response
    PoolBalance { guild_id: String },
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Response {
    None,
    Subscribed,
    Settlement(SettleOutcome),
    PoolBalance(f64),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum Packet {
    RequestPacket(Request),
    ResponsePacket(Response),
    Notification(SettlementNotice),
    Error,
}

/// A msgpack-framed websocket, either end.
pub struct Connection<S = TcpStream> {
    socket: WebSocketStream<S>,
}

impl Connection<TcpStream> {
    pub async fn from_tcp_stream(connection: TcpStream) -> anyhow::Result<Self> {
        let socket = tokio_tungstenite::accept_async(connection).await?;
        Ok(Self { socket })
    }
}

impl Connection<MaybeTlsStream<TcpStream>> {
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(address).await?;
        Ok(Self { socket })
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn read(&mut self) -> anyhow::Result<Packet> {
        loop {
            let message = match self.socket.next().await {
                Some(message) => message?,
                None => return Err(closed().into()),
            };
            match message {
                Message::Binary(data) => return Ok(rmp_serde::from_slice(&data)?),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => return Err(closed().into()),
                _ => bail!("incorrect data type received"),
            }
        }
    }

    pub async fn send(&mut self, data: Packet) -> anyhow::Result<()> {
        let bytes = rmp_serde::to_vec(&data)?;
        Ok(self.socket.send(Message::Binary(bytes)).await?)
    }
}

fn closed() -> std::io::Error {
    std::io::Error::new(ErrorKind::ConnectionAborted, "connection closed")
}
