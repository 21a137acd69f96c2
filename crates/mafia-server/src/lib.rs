//! WebSocket front end for the Mafia coordinator.
//!
//! Accepts connections, binds each to a login via the `Connect`
//! handshake, and routes client messages into the lobby and chat
//! layers. Every frame is a JSON-encoded [`mafia_protocol::ClientMessage`]
//! or [`mafia_protocol::ServerMessage`].

mod error;
mod handler;
mod server;
pub mod ws;

pub use error::ServerError;
pub use server::{MafiaServer, MafiaServerBuilder};
