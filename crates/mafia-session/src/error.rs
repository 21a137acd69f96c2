//! Error types for the registry layer.

use mafia_protocol::{ErrorKind, Login};

/// Errors that can occur while binding connections to identities.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Another live connection already holds this login.
    #[error("login {0} is already connected")]
    LoginTaken(Login),

    /// The connection has no bound identity (no `Connect` yet).
    #[error("connection is not registered")]
    NotRegistered,

    /// The connection already completed `Connect`.
    #[error("connection is already registered as {0}")]
    AlreadyRegistered(Login),
}

impl RegistryError {
    /// The wire-level failure class for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LoginTaken(_) | Self::AlreadyRegistered(_) => {
                ErrorKind::AlreadyAssigned
            }
            Self::NotRegistered => ErrorKind::InvalidAction,
        }
    }
}
