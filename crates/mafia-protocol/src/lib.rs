//! Wire protocol for the Mafia coordinator.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`GameSnapshot`],
//!   the status/role enums) — the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while encoding
//!   or decoding.
//!
//! The protocol layer sits between transport (raw bytes) and the game
//! layers. It doesn't know about connections, lobbies, or game rules —
//! it only knows how messages are shaped and serialized.

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ChatMessage, ClientMessage, Condition, ErrorKind, GameId, GameSnapshot,
    GameStatus, LobbyStatus, Login, PlayerInfo, Role, ServerMessage, Team,
};
