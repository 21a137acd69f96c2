//! Integration tests for the lobby: game creation, routing, fan-out.

use std::time::Duration;

use mafia_game::{GameError, GameRules};
use mafia_lobby::{LobbyError, LobbyManager, SnapshotSender};
use mafia_protocol::{
    Condition, GameId, GameSnapshot, GameStatus, LobbyStatus, Login,
};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

fn login(s: &str) -> Login {
    Login::from(s)
}

fn game_id(s: &str) -> GameId {
    GameId::from(s)
}

/// Rules with explicit head-counts and long phase budgets, so a timer
/// never fires under a test that is not about timers.
fn rules(min: usize, max: usize) -> GameRules {
    GameRules {
        min_players: min,
        max_players: max,
        day_budget: Duration::from_secs(600),
        night_budget: Duration::from_secs(600),
        ..GameRules::default()
    }
}

fn channel() -> (SnapshotSender, mpsc::UnboundedReceiver<GameSnapshot>) {
    mpsc::unbounded_channel()
}

/// A snapshot sender whose receiver is dropped immediately.
fn dummy_sender() -> SnapshotSender {
    mpsc::unbounded_channel().0
}

/// Drains every snapshot currently queued, returning the list.
fn drain(rx: &mut mpsc::UnboundedReceiver<GameSnapshot>) -> Vec<GameSnapshot> {
    let mut out = Vec::new();
    while let Ok(snap) = rx.try_recv() {
        out.push(snap);
    }
    out
}

// =========================================================================
// Join and creation
// =========================================================================

#[tokio::test]
async fn test_join_creates_game_and_first_snapshot_has_slots() {
    let mut mgr = LobbyManager::new(rules(5, 10));
    let (tx, mut rx) = channel();

    let id = mgr
        .join_game(login("ann"), Some(game_id("g1")), tx)
        .await
        .unwrap();

    assert_eq!(id, game_id("g1"));
    assert_eq!(mgr.game_count(), 1);
    assert_eq!(mgr.membership(&login("ann")), Some(&game_id("g1")));

    let snap = rx.try_recv().unwrap();
    assert_eq!(snap.lobby_status, LobbyStatus::HasSlots);
    assert_eq!(snap.game_status, GameStatus::NotStarted);
    assert_eq!(snap.players.len(), 1);
}

#[tokio::test]
async fn test_join_without_id_generates_one() {
    let mut mgr = LobbyManager::new(rules(5, 10));

    let id = mgr
        .join_game(login("ann"), None, dummy_sender())
        .await
        .unwrap();

    assert_eq!(id.0.len(), 8);
    assert!(id.0.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(mgr.game_count(), 1);
}

#[tokio::test]
async fn test_one_game_at_a_time() {
    let mut mgr = LobbyManager::new(rules(5, 10));
    mgr.join_game(login("ann"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();

    let err = mgr
        .join_game(login("ann"), Some(game_id("g2")), dummy_sender())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LobbyError::Game(GameError::AlreadyAssigned(..))
    ));
    assert_eq!(mgr.game_count(), 1);
}

#[tokio::test]
async fn test_join_full_lobby_rejected() {
    // High minimum keeps the game in NotStarted while it fills.
    let mut mgr = LobbyManager::new(rules(99, 2));
    mgr.join_game(login("ann"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();
    mgr.join_game(login("bob"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();

    let err = mgr
        .join_game(login("carl"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap_err();

    assert!(matches!(err, LobbyError::Game(GameError::LobbyFull(_))));
    let info = mgr.game_info(&game_id("g1")).await.unwrap();
    assert_eq!(info.players, 2);
}

#[tokio::test]
async fn test_auto_start_at_min_players_then_rejects_joins() {
    let mut mgr = LobbyManager::new(rules(2, 4));
    let (tx, mut rx) = channel();
    mgr.join_game(login("ann"), Some(game_id("g1")), tx)
        .await
        .unwrap();
    mgr.join_game(login("bob"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();

    let snapshots = drain(&mut rx);
    let last = snapshots.last().unwrap();
    assert_eq!(last.game_status, GameStatus::Day);
    assert_eq!(last.lobby_status, LobbyStatus::Full);

    let err = mgr
        .join_game(login("carl"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LobbyError::Game(GameError::GameInProgress(_))
    ));
}

// =========================================================================
// Snapshot fan-out
// =========================================================================

#[tokio::test]
async fn test_every_subscriber_sees_the_same_progression() {
    let mut mgr = LobbyManager::new(rules(3, 3));
    let (tx_a, mut rx_a) = channel();
    let (tx_b, mut rx_b) = channel();
    mgr.join_game(login("ann"), Some(game_id("g1")), tx_a)
        .await
        .unwrap();
    mgr.join_game(login("bob"), Some(game_id("g1")), tx_b)
        .await
        .unwrap();
    mgr.join_game(login("carl"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();

    // Ann watched all three joins, Bob the last two; both end on the
    // same started game.
    let for_ann = drain(&mut rx_a);
    let for_bob = drain(&mut rx_b);
    assert_eq!(for_ann.len(), 3);
    assert_eq!(for_bob.len(), 2);
    for snapshots in [&for_ann, &for_bob] {
        let counts: Vec<usize> =
            snapshots.iter().map(|s| s.players.len()).collect();
        assert!(counts.is_sorted(), "player count must not regress");
        assert_eq!(snapshots.last().unwrap().game_status, GameStatus::Day);
    }
}

#[tokio::test]
async fn test_votes_produce_snapshots_for_everyone() {
    let mut mgr = LobbyManager::new(rules(3, 3));
    let (tx_a, mut rx_a) = channel();
    let (tx_b, mut rx_b) = channel();
    mgr.join_game(login("ann"), Some(game_id("g1")), tx_a)
        .await
        .unwrap();
    mgr.join_game(login("bob"), Some(game_id("g1")), tx_b)
        .await
        .unwrap();
    mgr.join_game(login("carl"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    mgr.cast_vote(&login("ann"), login("bob")).await.unwrap();

    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(drain(&mut rx_b).len(), 1);
}

#[tokio::test]
async fn test_disconnect_mid_game_marks_ghost_and_stream_continues() {
    let mut mgr = LobbyManager::new(rules(3, 3));
    let (tx_b, mut rx_b) = channel();
    mgr.join_game(login("ann"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();
    mgr.join_game(login("bob"), Some(game_id("g1")), tx_b)
        .await
        .unwrap();
    mgr.join_game(login("carl"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();
    drain(&mut rx_b);

    mgr.disconnect(&login("ann")).await;

    let snapshots = drain(&mut rx_b);
    assert!(!snapshots.is_empty(), "survivors keep receiving");
    let last = snapshots.last().unwrap();
    let ann = last
        .players
        .iter()
        .find(|p| p.login == login("ann"))
        .unwrap();
    assert_eq!(ann.condition, Condition::Ghost);
    assert_eq!(mgr.membership(&login("ann")), None);
}

// =========================================================================
// Exit and teardown
// =========================================================================

#[tokio::test]
async fn test_exit_before_start_tears_down_empty_game() {
    let mut mgr = LobbyManager::new(rules(5, 10));
    mgr.join_game(login("ann"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();

    mgr.exit_game(&login("ann")).await.unwrap();

    assert_eq!(mgr.game_count(), 0);
    assert_eq!(mgr.membership(&login("ann")), None);
}

#[tokio::test]
async fn test_game_id_reusable_after_teardown() {
    let mut mgr = LobbyManager::new(rules(5, 10));
    mgr.join_game(login("ann"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();
    mgr.exit_game(&login("ann")).await.unwrap();

    let (tx, mut rx) = channel();
    mgr.join_game(login("bob"), Some(game_id("g1")), tx)
        .await
        .unwrap();

    let snap = rx.try_recv().unwrap();
    assert_eq!(snap.players.len(), 1, "fresh game, not the old one");
}

#[tokio::test]
async fn test_exit_when_not_in_any_game() {
    let mut mgr = LobbyManager::new(rules(5, 10));
    let err = mgr.exit_game(&login("ann")).await.unwrap_err();
    assert!(matches!(err, LobbyError::NotInGame(_)));
}

#[tokio::test]
async fn test_destroy_game_clears_members() {
    let mut mgr = LobbyManager::new(rules(5, 10));
    mgr.join_game(login("ann"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();

    mgr.destroy_game(&game_id("g1")).await;

    assert_eq!(mgr.game_count(), 0);
    assert_eq!(mgr.membership(&login("ann")), None);
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_vote_from_nonmember_rejected() {
    let mgr = LobbyManager::new(rules(5, 10));
    let err = mgr
        .cast_vote(&login("ann"), login("bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::NotInGame(_)));
}

#[tokio::test]
async fn test_night_action_during_day_rejected() {
    let mut mgr = LobbyManager::new(rules(3, 3));
    for name in ["ann", "bob", "carl"] {
        mgr.join_game(login(name), Some(game_id("g1")), dummy_sender())
            .await
            .unwrap();
    }

    // Game is in Day; a kill vote is out of phase no matter the role.
    let err = mgr
        .night_kill(&login("ann"), login("bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::Game(GameError::InvalidAction(_))));
}

#[tokio::test]
async fn test_game_info_for_unknown_game() {
    let mgr = LobbyManager::new(rules(5, 10));
    let err = mgr.game_info(&game_id("gX")).await.unwrap_err();
    assert!(matches!(err, LobbyError::NotFound(_)));
}

// =========================================================================
// Phase deadlines
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_day_deadline_forces_transition_to_night() {
    let mut mgr = LobbyManager::new(GameRules {
        min_players: 3,
        max_players: 3,
        day_budget: Duration::from_secs(60),
        night_budget: Duration::from_secs(30),
        ..GameRules::default()
    });
    let (tx, mut rx) = channel();
    mgr.join_game(login("ann"), Some(game_id("g1")), tx)
        .await
        .unwrap();
    mgr.join_game(login("bob"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();
    mgr.join_game(login("carl"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();
    assert_eq!(
        drain(&mut rx).last().unwrap().game_status,
        GameStatus::Day
    );

    // Nobody votes. Paused time fast-forwards to the armed deadline;
    // with no votes nobody is eliminated and the game moves on.
    let snap = rx.recv().await.unwrap();
    assert_eq!(snap.game_status, GameStatus::Night);
    for p in &snap.players {
        assert_eq!(p.condition, Condition::Alive);
    }
}

// =========================================================================
// Handle cloning and staged join/exit
// =========================================================================

#[tokio::test]
async fn test_actions_in_different_games_run_through_independent_handles() {
    let mut mgr = LobbyManager::new(rules(2, 2));
    for (name, game) in [("ann", "g1"), ("bob", "g1"), ("carl", "g2"), ("dora", "g2")] {
        mgr.join_game(login(name), Some(game_id(game)), dummy_sender())
            .await
            .unwrap();
    }

    // Owned handle clones route to their game without touching the
    // manager, so actions in separate games can be awaited concurrently.
    let g1 = mgr.game_handle(&login("ann")).unwrap();
    let g2 = mgr.game_handle(&login("carl")).unwrap();

    let (r1, r2) = tokio::join!(
        g1.vote(login("ann"), login("bob")),
        g2.vote(login("carl"), login("dora")),
    );
    r1.unwrap();
    r2.unwrap();
}

#[tokio::test]
async fn test_begin_join_reserves_membership_until_aborted() {
    let mut mgr = LobbyManager::new(rules(5, 10));

    let handle = mgr.begin_join(login("ann"), Some(game_id("g1"))).unwrap();
    assert_eq!(handle.game_id(), &game_id("g1"));
    assert_eq!(mgr.membership(&login("ann")), Some(&game_id("g1")));

    // The reservation holds the one-game-per-player invariant even
    // before the game has admitted the player.
    let err = mgr.begin_join(login("ann"), Some(game_id("g2"))).unwrap_err();
    assert!(matches!(
        err,
        LobbyError::Game(GameError::AlreadyAssigned(..))
    ));

    mgr.abort_join(&login("ann"), &LobbyError::Unavailable(game_id("g1")));
    assert_eq!(mgr.membership(&login("ann")), None);
    assert_eq!(mgr.game_count(), 0, "a dead game forfeits its id");
}

#[tokio::test]
async fn test_stale_handle_reports_unavailable_after_teardown() {
    let mut mgr = LobbyManager::new(rules(5, 10));
    mgr.join_game(login("ann"), Some(game_id("g1")), dummy_sender())
        .await
        .unwrap();

    let stale = mgr.game_handle(&login("ann")).unwrap();
    mgr.destroy_game(&game_id("g1")).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A join racing a teardown loses cleanly: the actor is gone, so the
    // caller learns the game no longer exists.
    let err = stale.join(login("bob"), dummy_sender()).await.unwrap_err();
    assert!(matches!(err, LobbyError::Unavailable(_)));
}
