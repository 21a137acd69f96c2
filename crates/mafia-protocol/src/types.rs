//! Core wire types.
//!
//! Everything here gets serialized to bytes, sent over the wire, and
//! deserialized on the other side. Snapshots are immutable once emitted;
//! a client never receives a partially-updated view of a game.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's login — an opaque identifier chosen by the client.
///
/// Unique within a game, and unique among concurrently connected sessions.
/// `#[serde(transparent)]` serializes `Login("ann")` as just `"ann"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Login(pub String);

impl Login {
    /// Returns the login as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Login {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A game's identifier, chosen by the first joiner (or generated by the
/// server when the joiner leaves it blank).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Game enums
// ---------------------------------------------------------------------------

/// A player's hidden role.
///
/// `Unknown` is both the pre-assignment value and the masked value sent
/// to viewers who are not allowed to see the real role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    Unknown,
    Mafia,
    Sheriff,
    Civilian,
}

/// Whether a player is still in play.
///
/// Transitions `Alive → Ghost` only, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Condition {
    #[default]
    Alive,
    Ghost,
}

impl Condition {
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Alive)
    }
}

/// The phase a game is in.
///
/// Advances `NotStarted → Day → Night → Day → … → Ended`; the only
/// permitted jump is to `Ended` when a win condition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GameStatus {
    #[default]
    NotStarted,
    Day,
    Night,
    Ended,
}

impl GameStatus {
    /// Returns `true` once the game has ended — no further mutation is
    /// accepted in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }

    /// Returns `true` while the Day/Night cycle is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Day | Self::Night)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Day => write!(f, "Day"),
            Self::Night => write!(f, "Night"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

/// Lobby capacity as reported to a caller.
///
/// Derived, never stored: computed from player count vs. capacity at the
/// moment a snapshot is built. `NotFound` appears only in the terminal
/// snapshot for a game that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyStatus {
    HasSlots,
    NotFound,
    Full,
}

/// The side that won an ended game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Team {
    /// The Mafia members.
    Mafia,
    /// Civilians plus the Sheriff.
    Town,
}

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// One player's row in a [`GameSnapshot`], as visible to a particular
/// viewer. The `role` field is already masked for that viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub login: Login,
    pub role: Role,
    pub condition: Condition,
    pub checked_by_sheriff: bool,
}

/// An immutable, fully-populated view of a game at a point in time.
///
/// Produced by the game state machine on every transition and pushed to
/// every subscriber of the game. Player order is join order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub id: GameId,
    pub lobby_status: LobbyStatus,
    pub game_status: GameStatus,
    pub players: Vec<PlayerInfo>,
    /// Set once `game_status` is `Ended`.
    pub winner: Option<Team>,
}

impl GameSnapshot {
    /// The terminal snapshot for a game that does not exist.
    pub fn not_found(id: GameId) -> Self {
        Self {
            id,
            lobby_status: LobbyStatus::NotFound,
            game_status: GameStatus::NotStarted,
            players: Vec::new(),
            winner: None,
        }
    }
}

/// A chat line. Immutable once emitted; subscribers receive chat in
/// publish order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub player_number: u32,
    pub player_name: String,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Error taxonomy at the boundary
// ---------------------------------------------------------------------------

/// The recoverable per-call failure classes returned to a caller.
///
/// None of these corrupt shared state or terminate other sessions'
/// streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Operation on a nonexistent game or player.
    NotFound,
    /// Join attempted on a game with no free slots.
    LobbyFull,
    /// Join attempted after the game started.
    GameInProgress,
    /// Action outside the permitted phase, role, or condition.
    InvalidAction,
    /// Duplicate join (or login) by the same identity.
    AlreadyAssigned,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Everything a client can send.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON, e.g.
/// `{ "type": "CastVote", "target": "bob" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Establishes the session: binds this connection to a login.
    /// Must be the first message on a connection.
    Connect { login: Login },

    /// Joins a game (creating it if absent) and subscribes the caller to
    /// its snapshot stream. `None` asks the server to generate an id.
    JoinGame { game_id: Option<GameId> },

    /// Leaves the current game.
    ExitGame,

    /// Day-phase vote to eliminate `target`.
    CastVote { target: Login },

    /// Night-phase Mafia kill vote.
    NightKill { target: Login },

    /// Night-phase Sheriff inspection.
    SheriffCheck { target: Login },

    /// Publishes a chat line to the feed.
    SendChat { text: String },

    /// Subscribes the caller to the chat feed. Only messages published
    /// after subscription are delivered — there is no replay.
    SubscribeChat,

    /// Orderly goodbye. Includes a human-readable reason for logs.
    Disconnect { reason: String },
}

/// Everything the server can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Acknowledges `Connect`. `player_number` is the session's ordinal,
    /// used to attribute chat lines.
    Connected { login: Login, player_number: u32 },

    /// A game state snapshot, masked for the receiving viewer.
    Snapshot(GameSnapshot),

    /// A chat line from the feed.
    Chat(ChatMessage),

    /// A recoverable per-call failure.
    Error { kind: ErrorKind, message: String },
}

// =========================================================================
// Tests
// =========================================================================
