//! Error types for the game rules layer.

use mafia_protocol::{ErrorKind, GameId, Login};

/// Recoverable failures returned to the caller of a game operation.
///
/// None of these mutate state: a rejected vote or join leaves the game
/// exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The lobby has no free slots.
    #[error("game {0} is full")]
    LobbyFull(GameId),

    /// Join attempted after the game started.
    #[error("game {0} is already in progress")]
    GameInProgress(GameId),

    /// The same login joined this game twice.
    #[error("player {0} already joined game {1}")]
    AlreadyAssigned(Login, GameId),

    /// The named player is not a member of this game.
    #[error("player {0} not found in game {1}")]
    UnknownPlayer(Login, GameId),

    /// Action outside the permitted phase, role, or condition — a Ghost
    /// voting, a Civilian inspecting, a kill during the Day, and so on.
    #[error("invalid action: {0}")]
    InvalidAction(String),
}

impl GameError {
    /// The wire-level failure class for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LobbyFull(_) => ErrorKind::LobbyFull,
            Self::GameInProgress(_) => ErrorKind::GameInProgress,
            Self::AlreadyAssigned(..) => ErrorKind::AlreadyAssigned,
            // A non-member's action fails at the player lookup, before
            // any phase or role rule runs, so it reports as a missing
            // player rather than an invalid action.
            Self::UnknownPlayer(..) => ErrorKind::NotFound,
            Self::InvalidAction(_) => ErrorKind::InvalidAction,
        }
    }
}
