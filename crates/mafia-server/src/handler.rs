//! Per-connection handler: Connect handshake and message routing.
//!
//! Each accepted connection gets its own Tokio task running this
//! handler. The flow is:
//!   1. Receive `Connect` → bind the login in the registry
//!   2. Send `Connected` → the session is live
//!   3. Loop: decode client messages → dispatch to lobby/chat
//!
//! All outbound traffic for the session (replies, snapshots, chat)
//! funnels through one unbounded queue drained by a writer task, so a
//! blocked write never stalls game processing, and everything a single
//! source produced stays in order.

use std::sync::Arc;
use std::time::Duration;

use mafia_lobby::LobbyError;
use mafia_protocol::{
    ChatMessage, ClientMessage, Codec, ErrorKind, GameSnapshot, Login,
    ProtocolError, ServerMessage,
};
use mafia_session::{ConnectionId, Registration};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::ws::{WsConnection, WsReader};
use crate::ServerError;

/// How long a fresh connection gets to send `Connect`.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Drop guard that cleans a session up when the handler exits, even on
/// panic. `Drop` is synchronous, so the async cleanup runs in a
/// fire-and-forget task.
struct ConnectionGuard {
    conn_id: ConnectionId,
    state: Arc<ServerState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let released = state.registry.lock().await.release(conn_id);
            state.chat.lock().await.unsubscribe(conn_id.into_inner());
            if let Some(login) = released {
                match leave_game(&state, &login).await {
                    Ok(()) | Err(LobbyError::NotInGame(_)) => {}
                    Err(err) => {
                        tracing::warn!(%login, %err, "disconnect cleanup failed");
                    }
                }
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WsConnection,
    state: Arc<ServerState>,
) -> Result<(), ServerError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (mut writer, mut reader) = conn.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let codec = state.codec;
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let bytes = match codec.encode(&msg) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::error!(%err, "failed to encode outbound message");
                    continue;
                }
            };
            if writer.send(bytes).await.is_err() {
                break;
            }
        }
        writer.close().await;
    });

    let result = run_session(conn_id, &mut reader, &out_tx, &state).await;

    // Dropping the queue lets the writer drain what's left and close.
    drop(out_tx);
    let _ = writer_task.await;
    result
}

async fn run_session(
    conn_id: ConnectionId,
    reader: &mut WsReader,
    out: &Outbound,
    state: &Arc<ServerState>,
) -> Result<(), ServerError> {
    let registration = connect_handshake(conn_id, reader, out, state).await?;
    let _guard = ConnectionGuard {
        conn_id,
        state: Arc::clone(state),
    };
    let login = registration.login.clone();
    tracing::info!(%conn_id, %login, "session established");

    loop {
        let data = match reader.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%login, "connection closed");
                break;
            }
            Err(err) => {
                tracing::debug!(%login, %err, "recv error");
                break;
            }
        };

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(%login, %err, "undecodable message");
                send_error(out, ErrorKind::InvalidAction, &format!("bad message: {err}"));
                continue;
            }
        };

        if dispatch(conn_id, &registration, msg, out, state).await {
            break;
        }
    }

    // _guard drops here → registry release and exit-as-disconnect fire.
    Ok(())
}

/// Waits for `Connect`, binds the login, and acknowledges.
async fn connect_handshake(
    conn_id: ConnectionId,
    reader: &mut WsReader,
    out: &Outbound,
    state: &Arc<ServerState>,
) -> Result<Registration, ServerError> {
    let data = match tokio::time::timeout(CONNECT_TIMEOUT, reader.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before Connect".into(),
            )
            .into());
        }
        Ok(Err(err)) => return Err(err.into()),
        Err(_) => {
            return Err(
                ProtocolError::InvalidMessage("Connect timed out".into()).into()
            );
        }
    };

    let msg: ClientMessage = state.codec.decode(&data)?;
    let ClientMessage::Connect { login } = msg else {
        send_error(out, ErrorKind::InvalidAction, "first message must be Connect");
        return Err(ProtocolError::InvalidMessage(
            "first message must be Connect".into(),
        )
        .into());
    };

    let result = state.registry.lock().await.register(conn_id, login);
    match result {
        Ok(registration) => {
            let _ = out.send(ServerMessage::Connected {
                login: registration.login.clone(),
                player_number: registration.player_number,
            });
            Ok(registration)
        }
        Err(err) => {
            send_error(out, err.kind(), &err.to_string());
            Err(err.into())
        }
    }
}

/// Routes one client message. Returns `true` when the connection should
/// close. Per-call failures go back to this caller only; they never
/// touch other sessions.
async fn dispatch(
    conn_id: ConnectionId,
    registration: &Registration,
    msg: ClientMessage,
    out: &Outbound,
    state: &Arc<ServerState>,
) -> bool {
    let login = &registration.login;
    match msg {
        ClientMessage::Connect { .. } => {
            send_error(out, ErrorKind::AlreadyAssigned, "already connected");
        }

        ClientMessage::JoinGame { game_id } => {
            let (tx, rx) = mpsc::unbounded_channel::<GameSnapshot>();
            tokio::spawn(forward_snapshots(rx, out.clone()));

            // The lobby lock covers only the index reservation; the
            // actor round-trip runs unlocked so other games stay
            // responsive.
            let begun = state.lobby.lock().await.begin_join(login.clone(), game_id);
            match begun {
                Ok(handle) => match handle.join(login.clone(), tx).await {
                    Ok(()) => {
                        tracing::info!(%login, game_id = %handle.game_id(), "joined game");
                    }
                    Err(err) => {
                        state.lobby.lock().await.abort_join(login, &err);
                        let _ = out.send(join_failure_reply(err));
                    }
                },
                Err(err) => {
                    let _ = out.send(join_failure_reply(err));
                }
            }
        }

        ClientMessage::ExitGame => {
            if let Err(err) = leave_game(state, login).await {
                send_error(out, err.kind(), &err.to_string());
            }
        }

        ClientMessage::CastVote { target } => {
            let handle = state.lobby.lock().await.game_handle(login);
            let result = match handle {
                Ok(handle) => handle.vote(login.clone(), target).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                send_error(out, err.kind(), &err.to_string());
            }
        }

        ClientMessage::NightKill { target } => {
            let handle = state.lobby.lock().await.game_handle(login);
            let result = match handle {
                Ok(handle) => handle.kill(login.clone(), target).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                send_error(out, err.kind(), &err.to_string());
            }
        }

        ClientMessage::SheriffCheck { target } => {
            let handle = state.lobby.lock().await.game_handle(login);
            let result = match handle {
                Ok(handle) => handle.inspect(login.clone(), target).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                send_error(out, err.kind(), &err.to_string());
            }
        }

        ClientMessage::SendChat { text } => {
            let msg = ChatMessage {
                player_number: registration.player_number,
                player_name: login.to_string(),
                text,
            };
            state.chat.lock().await.publish(msg);
        }

        ClientMessage::SubscribeChat => {
            let (tx, rx) = mpsc::unbounded_channel::<ChatMessage>();
            tokio::spawn(forward_chat(rx, out.clone()));
            state
                .chat
                .lock()
                .await
                .subscribe(conn_id.into_inner(), tx);
        }

        ClientMessage::Disconnect { reason } => {
            tracing::info!(%login, %reason, "client disconnected");
            return true;
        }
    }
    false
}

/// The reply for a join the lobby turned down. A game that vanished
/// between lookup and join gets the terminal not-found snapshot rather
/// than an error, so the subscriber's stream still ends with a
/// snapshot.
fn join_failure_reply(err: LobbyError) -> ServerMessage {
    match err {
        LobbyError::Unavailable(id) | LobbyError::NotFound(id) => {
            ServerMessage::Snapshot(GameSnapshot::not_found(id))
        }
        err => ServerMessage::Error {
            kind: err.kind(),
            message: err.to_string(),
        },
    }
}

/// Exits the player's current game. The lobby lock is held only for
/// the index updates on either side of the actor round-trip.
async fn leave_game(
    state: &Arc<ServerState>,
    login: &Login,
) -> Result<(), LobbyError> {
    let handle = state.lobby.lock().await.begin_exit(login)?;
    match handle.exit(login.clone()).await {
        Ok(0) => {
            state.lobby.lock().await.destroy_game(handle.game_id()).await;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(err @ LobbyError::Unavailable(_)) => {
            state.lobby.lock().await.destroy_game(handle.game_id()).await;
            Err(err)
        }
        Err(err) => Err(err),
    }
}

/// Copies a game's snapshot stream into the session's outbound queue.
/// Ends when either side goes away.
async fn forward_snapshots(
    mut rx: mpsc::UnboundedReceiver<GameSnapshot>,
    out: Outbound,
) {
    while let Some(snapshot) = rx.recv().await {
        if out.send(ServerMessage::Snapshot(snapshot)).is_err() {
            break;
        }
    }
}

/// Copies the chat feed into the session's outbound queue.
async fn forward_chat(mut rx: mpsc::UnboundedReceiver<ChatMessage>, out: Outbound) {
    while let Some(msg) = rx.recv().await {
        if out.send(ServerMessage::Chat(msg)).is_err() {
            break;
        }
    }
}

fn send_error(out: &Outbound, kind: ErrorKind, message: &str) {
    let _ = out.send(ServerMessage::Error {
        kind,
        message: message.to_string(),
    });
}
