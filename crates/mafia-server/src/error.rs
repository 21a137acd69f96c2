//! Unified error type for the server crate.

use mafia_lobby::LobbyError;
use mafia_protocol::ProtocolError;
use mafia_session::RegistryError;

use crate::ws::WsError;

/// Top-level error wrapping every layer's failures.
///
/// The `#[from]` attributes let `?` convert sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level failure (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] WsError),

    /// Encode/decode or malformed-message failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Login registration failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Game or lobby failure.
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// Bad operator-supplied configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
