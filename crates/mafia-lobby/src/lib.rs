//! Lobby orchestration for the Mafia coordinator.
//!
//! Each game runs as its own actor task owning a
//! [`mafia_game::GameState`]; the [`LobbyManager`] creates games on
//! demand, enforces the one-game-per-player invariant, and routes
//! actions to the right actor. The [`ChatBroadcaster`] is the
//! server-wide chat feed, independent of any game.
//!
//! Snapshots flow one way: every successful mutation inside an actor
//! produces a per-viewer masked snapshot pushed to each subscriber's
//! private queue. A slow subscriber buffers; it never blocks the game
//! or its neighbors.

mod chat;
mod error;
mod manager;
mod table;

pub use chat::{ChatBroadcaster, ChatSender};
pub use error::LobbyError;
pub use manager::LobbyManager;
pub use table::{GameHandle, SnapshotSender, TableInfo};
