//! Player registry for the Mafia coordinator.
//!
//! Binds transport-level connections to player identities for the
//! duration of a session. The registry holds no game state — players
//! belong to their game — it only answers "who is this connection" and
//! "is this login already in use".
//!
//! # Concurrency note
//!
//! `PlayerRegistry` is not thread-safe by itself — it uses plain
//! `HashMap`s and is accessed through a mutex at a higher level.
//! Keeping it simple here avoids hidden locking overhead.

mod error;
mod registry;

pub use error::RegistryError;
pub use registry::{ConnectionId, PlayerRegistry, Registration};
