//! End-to-end tests: real WebSocket clients against a running server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mafia_game::GameRules;
use mafia_protocol::{
    ClientMessage, ErrorKind, GameId, GameStatus, LobbyStatus, Login, Role,
    ServerMessage,
};
use mafia_server::MafiaServer;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Rules with long budgets so phase timers never fire mid-test.
fn quiet_rules(min: usize, max: usize) -> GameRules {
    GameRules {
        min_players: min,
        max_players: max,
        day_budget: Duration::from_secs(600),
        night_budget: Duration::from_secs(600),
        ..GameRules::default()
    }
}

/// Starts a server on a random port and returns its address.
async fn start_server(rules: GameRules) -> String {
    let server = MafiaServer::builder()
        .bind("127.0.0.1:0")
        .rules(rules)
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_msg(ws: &mut ClientWs, msg: &ClientMessage) {
    let bytes = serde_json::to_vec(msg).expect("encode");
    ws.send(Message::Binary(bytes.into())).await.expect("send");
}

async fn recv_msg(ws: &mut ClientWs) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for server message")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Binary(data) => {
                return serde_json::from_slice(&data).expect("decode");
            }
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("decode");
            }
            _ => continue,
        }
    }
}

/// Connects and completes the `Connect` handshake for `login`.
async fn session(addr: &str, login: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    send_msg(
        &mut ws,
        &ClientMessage::Connect {
            login: Login::from(login),
        },
    )
    .await;
    match recv_msg(&mut ws).await {
        ServerMessage::Connected { .. } => ws,
        other => panic!("expected Connected, got {other:?}"),
    }
}

/// Reads server messages until a snapshot in `status` arrives.
async fn snapshot_in_phase(
    ws: &mut ClientWs,
    status: GameStatus,
) -> mafia_protocol::GameSnapshot {
    loop {
        if let ServerMessage::Snapshot(snap) = recv_msg(ws).await {
            if snap.game_status == status {
                return snap;
            }
        }
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_connect_acknowledged_with_player_number() {
    let addr = start_server(quiet_rules(5, 10)).await;
    let mut ws = connect(&addr).await;

    send_msg(
        &mut ws,
        &ClientMessage::Connect {
            login: Login::from("ann"),
        },
    )
    .await;

    match recv_msg(&mut ws).await {
        ServerMessage::Connected {
            login,
            player_number,
        } => {
            assert_eq!(login, Login::from("ann"));
            assert!(player_number >= 1);
        }
        other => panic!("expected Connected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_login_rejected() {
    let addr = start_server(quiet_rules(5, 10)).await;
    let _ws1 = session(&addr, "ann").await;

    let mut ws2 = connect(&addr).await;
    send_msg(
        &mut ws2,
        &ClientMessage::Connect {
            login: Login::from("ann"),
        },
    )
    .await;

    match recv_msg(&mut ws2).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::AlreadyAssigned);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_message_must_be_connect() {
    let addr = start_server(quiet_rules(5, 10)).await;
    let mut ws = connect(&addr).await;

    send_msg(
        &mut ws,
        &ClientMessage::SendChat {
            text: "hello?".into(),
        },
    )
    .await;

    match recv_msg(&mut ws).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::InvalidAction);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_login_free_again_after_disconnect() {
    let addr = start_server(quiet_rules(5, 10)).await;

    let mut ws1 = session(&addr, "ann").await;
    send_msg(
        &mut ws1,
        &ClientMessage::Disconnect {
            reason: "bye".into(),
        },
    )
    .await;
    // Wait for the server to close our side, then for cleanup to land.
    let _ = tokio::time::timeout(Duration::from_secs(2), ws1.next()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let _ws2 = session(&addr, "ann").await;
}

// =========================================================================
// Games over the wire
// =========================================================================

#[tokio::test]
async fn test_join_game_streams_first_snapshot() {
    let addr = start_server(quiet_rules(5, 10)).await;
    let mut ws = session(&addr, "ann").await;

    send_msg(
        &mut ws,
        &ClientMessage::JoinGame {
            game_id: Some(GameId::from("g1")),
        },
    )
    .await;

    match recv_msg(&mut ws).await {
        ServerMessage::Snapshot(snap) => {
            assert_eq!(snap.id, GameId::from("g1"));
            assert_eq!(snap.lobby_status, LobbyStatus::HasSlots);
            assert_eq!(snap.game_status, GameStatus::NotStarted);
            assert_eq!(snap.players.len(), 1);
        }
        other => panic!("expected Snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn test_game_starts_and_each_player_sees_own_role() {
    let addr = start_server(quiet_rules(3, 3)).await;
    let mut clients = Vec::new();
    for name in ["ann", "bob", "carl"] {
        let mut ws = session(&addr, name).await;
        send_msg(
            &mut ws,
            &ClientMessage::JoinGame {
                game_id: Some(GameId::from("g1")),
            },
        )
        .await;
        clients.push((name, ws));
    }

    for (name, ws) in &mut clients {
        let snap = snapshot_in_phase(ws, GameStatus::Day).await;
        assert_eq!(snap.players.len(), 3);
        let own = snap
            .players
            .iter()
            .find(|p| p.login == Login::from(*name))
            .expect("own row present");
        assert_ne!(own.role, Role::Unknown, "own role is always visible");
    }
}

#[tokio::test]
async fn test_vote_without_game_is_not_found() {
    let addr = start_server(quiet_rules(5, 10)).await;
    let mut ws = session(&addr, "ann").await;

    send_msg(
        &mut ws,
        &ClientMessage::CastVote {
            target: Login::from("bob"),
        },
    )
    .await;

    match recv_msg(&mut ws).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::NotFound);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exit_game_then_rejoin() {
    let addr = start_server(quiet_rules(5, 10)).await;
    let mut ws = session(&addr, "ann").await;

    send_msg(
        &mut ws,
        &ClientMessage::JoinGame {
            game_id: Some(GameId::from("g1")),
        },
    )
    .await;
    let _ = recv_msg(&mut ws).await;

    send_msg(&mut ws, &ClientMessage::ExitGame).await;
    send_msg(
        &mut ws,
        &ClientMessage::JoinGame {
            game_id: Some(GameId::from("g2")),
        },
    )
    .await;

    // The next snapshot we see is for the new game.
    loop {
        if let ServerMessage::Snapshot(snap) = recv_msg(&mut ws).await {
            if snap.id == GameId::from("g2") {
                assert_eq!(snap.players.len(), 1);
                break;
            }
        }
    }
}

// =========================================================================
// Chat
// =========================================================================

#[tokio::test]
async fn test_chat_fans_out_in_publish_order() {
    let addr = start_server(quiet_rules(5, 10)).await;
    let mut ann = session(&addr, "ann").await;
    let mut bob = session(&addr, "bob").await;

    send_msg(&mut ann, &ClientMessage::SubscribeChat).await;
    send_msg(&mut bob, &ClientMessage::SubscribeChat).await;
    // Subscriptions race the first publish; give them a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    send_msg(
        &mut ann,
        &ClientMessage::SendChat {
            text: "first".into(),
        },
    )
    .await;
    send_msg(
        &mut ann,
        &ClientMessage::SendChat {
            text: "second".into(),
        },
    )
    .await;

    for ws in [&mut ann, &mut bob] {
        match recv_msg(ws).await {
            ServerMessage::Chat(msg) => {
                assert_eq!(msg.text, "first");
                assert_eq!(msg.player_name, "ann");
            }
            other => panic!("expected Chat, got {other:?}"),
        }
        match recv_msg(ws).await {
            ServerMessage::Chat(msg) => assert_eq!(msg.text, "second"),
            other => panic!("expected Chat, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_chat_has_no_replay_for_late_subscriber() {
    let addr = start_server(quiet_rules(5, 10)).await;
    let mut ann = session(&addr, "ann").await;
    send_msg(&mut ann, &ClientMessage::SubscribeChat).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    send_msg(
        &mut ann,
        &ClientMessage::SendChat {
            text: "early".into(),
        },
    )
    .await;
    match recv_msg(&mut ann).await {
        ServerMessage::Chat(msg) => assert_eq!(msg.text, "early"),
        other => panic!("expected Chat, got {other:?}"),
    }

    let mut bob = session(&addr, "bob").await;
    send_msg(&mut bob, &ClientMessage::SubscribeChat).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    send_msg(
        &mut ann,
        &ClientMessage::SendChat {
            text: "late".into(),
        },
    )
    .await;

    match recv_msg(&mut bob).await {
        ServerMessage::Chat(msg) => {
            assert_eq!(msg.text, "late", "no replay of earlier chat");
        }
        other => panic!("expected Chat, got {other:?}"),
    }
}

// =========================================================================
// Robustness
// =========================================================================

#[tokio::test]
async fn test_garbage_frame_gets_error_and_session_survives() {
    let addr = start_server(quiet_rules(5, 10)).await;
    let mut ws = session(&addr, "ann").await;

    ws.send(Message::Binary(b"not json".to_vec().into()))
        .await
        .expect("send");
    match recv_msg(&mut ws).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::InvalidAction);
        }
        other => panic!("expected Error, got {other:?}"),
    }

    // Session still works.
    send_msg(
        &mut ws,
        &ClientMessage::JoinGame {
            game_id: Some(GameId::from("g1")),
        },
    )
    .await;
    assert!(matches!(
        recv_msg(&mut ws).await,
        ServerMessage::Snapshot(_)
    ));
}

#[tokio::test]
async fn test_disconnect_mid_lobby_frees_the_slot() {
    let addr = start_server(quiet_rules(3, 3)).await;

    let mut ann = session(&addr, "ann").await;
    send_msg(
        &mut ann,
        &ClientMessage::JoinGame {
            game_id: Some(GameId::from("g1")),
        },
    )
    .await;
    let _ = recv_msg(&mut ann).await;
    drop(ann); // transport closure, no goodbye
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The empty game was torn down; the id starts fresh.
    let mut bob = session(&addr, "bob").await;
    send_msg(
        &mut bob,
        &ClientMessage::JoinGame {
            game_id: Some(GameId::from("g1")),
        },
    )
    .await;
    match recv_msg(&mut bob).await {
        ServerMessage::Snapshot(snap) => {
            assert_eq!(snap.players.len(), 1);
        }
        other => panic!("expected Snapshot, got {other:?}"),
    }
}
