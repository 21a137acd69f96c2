//! WebSocket transport using `tokio-tungstenite`.
//!
//! A connection is split into independent reader and writer halves: the
//! handler task reads client messages while a dedicated writer task
//! drains the session's outbound queue. Neither side ever waits for the
//! other.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use mafia_session::ConnectionId;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("failed to bind or accept: {0}")]
    Accept(#[source] std::io::Error),

    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("send failed: {0}")]
    Send(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] tokio_tungstenite::tungstenite::Error),
}

/// Listens for incoming WebSocket connections.
pub struct WsListener {
    listener: TcpListener,
}

impl WsListener {
    pub async fn bind(addr: &str) -> Result<Self, WsError> {
        let listener = TcpListener::bind(addr).await.map_err(WsError::Accept)?;
        tracing::info!(addr, "WebSocket listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts one TCP connection and upgrades it to WebSocket.
    pub async fn accept(&self) -> Result<WsConnection, WsError> {
        let (stream, addr) = self.listener.accept().await.map_err(WsError::Accept)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(WsError::Handshake)?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        Ok(WsConnection { id, ws })
    }
}

/// A single accepted connection, not yet split.
pub struct WsConnection {
    id: ConnectionId,
    ws: WsStream,
}

impl WsConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Splits into independent writer and reader halves.
    pub fn split(self) -> (WsWriter, WsReader) {
        let (sink, stream) = self.ws.split();
        (WsWriter { sink }, WsReader { stream })
    }
}

/// The outbound half of a connection.
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

impl WsWriter {
    pub async fn send(&mut self, data: Vec<u8>) -> Result<(), WsError> {
        self.sink
            .send(Message::Binary(data.into()))
            .await
            .map_err(WsError::Send)
    }

    pub async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

/// The inbound half of a connection.
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

impl WsReader {
    /// Receives the next data frame. Text frames are passed through as
    /// their UTF-8 bytes; control frames are skipped. `None` means the
    /// peer closed.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, WsError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => return Err(WsError::Receive(e)),
            }
        }
    }
}
