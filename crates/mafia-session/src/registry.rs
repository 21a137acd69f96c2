//! The player registry: who is connected, under which login.

use std::collections::HashMap;
use std::fmt;

use mafia_protocol::Login;

use crate::RegistryError;

/// Opaque identifier for a transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub login: Login,
    /// Sequential ordinal of this session, used to attribute chat lines.
    pub player_number: u32,
}

/// Tracks which connection speaks for which login.
///
/// Two maps kept in sync: login → connection for uniqueness checks,
/// connection → registration for per-connection lookups. An entry lives
/// exactly as long as its connection; disconnect releases the login
/// immediately (disconnect is terminal, there is no grace period).
#[derive(Default)]
pub struct PlayerRegistry {
    logins: HashMap<Login, ConnectionId>,
    connections: HashMap<ConnectionId, Registration>,
    next_number: u32,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `conn` to `login` and assigns the session's player number.
    ///
    /// # Errors
    /// - [`RegistryError::AlreadyRegistered`] — this connection already
    ///   completed `Connect`.
    /// - [`RegistryError::LoginTaken`] — another live connection holds
    ///   the login.
    pub fn register(
        &mut self,
        conn: ConnectionId,
        login: Login,
    ) -> Result<Registration, RegistryError> {
        if let Some(existing) = self.connections.get(&conn) {
            return Err(RegistryError::AlreadyRegistered(
                existing.login.clone(),
            ));
        }
        if self.logins.contains_key(&login) {
            return Err(RegistryError::LoginTaken(login));
        }

        self.next_number += 1;
        let registration = Registration {
            login: login.clone(),
            player_number: self.next_number,
        };
        self.logins.insert(login.clone(), conn);
        self.connections.insert(conn, registration.clone());
        tracing::info!(%conn, %login, number = self.next_number, "player registered");
        Ok(registration)
    }

    /// Drops the binding for a closed connection. Returns the login it
    /// held, if any — the caller uses it for exit-as-disconnect cleanup.
    pub fn release(&mut self, conn: ConnectionId) -> Option<Login> {
        let registration = self.connections.remove(&conn)?;
        self.logins.remove(&registration.login);
        tracing::info!(%conn, login = %registration.login, "player released");
        Some(registration.login)
    }

    /// The registration bound to a connection, if `Connect` completed.
    pub fn get(&self, conn: ConnectionId) -> Option<&Registration> {
        self.connections.get(&conn)
    }

    /// The connection currently holding a login, if any.
    pub fn lookup(&self, login: &Login) -> Option<ConnectionId> {
        self.logins.get(login).copied()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
