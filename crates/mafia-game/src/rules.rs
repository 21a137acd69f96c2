//! Game rule configuration.

use std::time::Duration;

/// Configured thresholds for a game.
///
/// These are policy values supplied by the operator, not constants of
/// the rules engine.
#[derive(Debug, Clone)]
pub struct GameRules {
    /// Players required before the game auto-starts.
    pub min_players: usize,

    /// Maximum players admitted to the lobby.
    pub max_players: usize,

    /// One Mafia member per this many players (minimum one Mafia).
    pub mafia_ratio: usize,

    /// Soft deadline for Day voting. When it elapses the tally runs
    /// with whatever votes were cast.
    pub day_budget: Duration,

    /// Soft deadline for Night actions.
    pub night_budget: Duration,

    /// When set, players the Sheriff has inspected are revealed to
    /// everyone, not just the Sheriff.
    pub reveal_sheriff_checks: bool,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            min_players: 5,
            max_players: 10,
            mafia_ratio: 4,
            day_budget: Duration::from_secs(60),
            night_budget: Duration::from_secs(30),
            reveal_sheriff_checks: false,
        }
    }
}

impl GameRules {
    /// Mafia head-count for a game of `players`.
    pub fn mafia_count(&self, players: usize) -> usize {
        (players / self.mafia_ratio).max(1)
    }
}
