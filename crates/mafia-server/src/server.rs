//! `MafiaServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → registry → lobby.

use std::sync::Arc;

use mafia_game::GameRules;
use mafia_lobby::{ChatBroadcaster, LobbyManager};
use mafia_protocol::JsonCodec;
use mafia_session::PlayerRegistry;
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::ws::WsListener;
use crate::ServerError;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it clones cheaply across tasks; interior
/// mutability via `Mutex` where needed. The lobby mutex only guards the
/// game index — each game mutates inside its own actor task.
pub(crate) struct ServerState {
    pub(crate) registry: Mutex<PlayerRegistry>,
    pub(crate) lobby: Mutex<LobbyManager>,
    pub(crate) chat: Mutex<ChatBroadcaster>,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a server.
///
/// # Example
///
/// ```rust,ignore
/// let server = MafiaServer::builder()
///     .bind("0.0.0.0:9000")
///     .rules(GameRules::default())
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct MafiaServerBuilder {
    bind_addr: String,
    rules: GameRules,
}

impl MafiaServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            rules: GameRules::default(),
        }
    }

    /// Sets the address to bind to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the game rules every new game starts with.
    pub fn rules(mut self, rules: GameRules) -> Self {
        self.rules = rules;
        self
    }

    /// Binds the listener and assembles the server.
    pub async fn build(self) -> Result<MafiaServer, ServerError> {
        let listener = WsListener::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Mutex::new(PlayerRegistry::new()),
            lobby: Mutex::new(LobbyManager::new(self.rules)),
            chat: Mutex::new(ChatBroadcaster::new()),
            codec: JsonCodec,
        });

        Ok(MafiaServer { listener, state })
    }
}

impl Default for MafiaServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running coordinator server. Call [`run()`](Self::run) to start
/// accepting connections.
pub struct MafiaServer {
    listener: WsListener,
    state: Arc<ServerState>,
}

impl MafiaServer {
    pub fn builder() -> MafiaServerBuilder {
        MafiaServerBuilder::new()
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop: each connection gets its own handler task.
    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("mafia coordinator running");

        loop {
            match self.listener.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %err,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(err) => {
                    tracing::error!(error = %err, "accept failed");
                }
            }
        }
    }
}
