//! Error types for the lobby layer.

use mafia_game::GameError;
use mafia_protocol::{ErrorKind, GameId, Login};

/// Failures surfaced by the lobby manager and game actors.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// A rule-level rejection from the game itself.
    #[error(transparent)]
    Game(#[from] GameError),

    /// No game with this id exists.
    #[error("game {0} not found")]
    NotFound(GameId),

    /// The player is not a member of any game.
    #[error("player {0} is not in any game")]
    NotInGame(Login),

    /// The game's actor task is gone (torn down or crashed); the
    /// operation cannot be delivered.
    #[error("game {0} is no longer available")]
    Unavailable(GameId),
}

impl LobbyError {
    /// The wire-level failure class for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Game(err) => err.kind(),
            // Routing failures happen before the game sees the action:
            // the target of the lookup (game or membership) is missing,
            // which is a different class than a rule rejection.
            Self::NotFound(_) | Self::NotInGame(_) | Self::Unavailable(_) => {
                ErrorKind::NotFound
            }
        }
    }
}
