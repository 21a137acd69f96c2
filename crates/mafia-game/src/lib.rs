//! The Mafia game state machine.
//!
//! Pure game rules with no I/O: role assignment, Day voting, Night
//! actions, elimination, and win detection. The surrounding actor layer
//! owns timers and fan-out; this crate only ever sees *events* — a vote
//! arrived, a player left, a phase deadline elapsed — and answers with
//! how the state advanced. That keeps every rule deterministic and
//! testable without a runtime or a real clock.
//!
//! # Key types
//!
//! - [`GameState`] — one game's full authoritative state
//! - [`GameRules`] — configured thresholds (player counts, ratios, budgets)
//! - [`Progress`] — what a mutation did (in particular, phase entered)
//! - [`GameError`] — recoverable per-call failures

mod error;
mod rules;
mod state;

pub use error::GameError;
pub use rules::GameRules;
pub use state::{GameState, Player, Progress};
