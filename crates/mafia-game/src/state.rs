//! One game's authoritative state and its transition rules.
//!
//! `GameState` is mutated by exactly one owner (the game's actor task),
//! so nothing here is synchronized. Every mutating method either
//! advances the state and reports what happened through [`Progress`],
//! or rejects the call with a [`GameError`] and leaves the state
//! untouched.

use std::collections::HashMap;

use mafia_protocol::{
    Condition, GameId, GameSnapshot, GameStatus, LobbyStatus, Login,
    PlayerInfo, Role, Team,
};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::{GameError, GameRules};

/// A member of a game. Holds the real, unmasked role.
#[derive(Debug, Clone)]
pub struct Player {
    pub login: Login,
    pub role: Role,
    pub condition: Condition,
    pub checked_by_sheriff: bool,
}

impl Player {
    fn new(login: Login) -> Self {
        Self {
            login,
            role: Role::Unknown,
            condition: Condition::Alive,
            checked_by_sheriff: false,
        }
    }

    fn is_alive(&self) -> bool {
        self.condition.is_alive()
    }
}

/// What a mutation did to the game.
///
/// `entered` is set when the call moved the game into a new phase
/// (possibly skipping straight to `Ended` on a win). The caller uses it
/// to re-arm phase deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Progress {
    /// The phase entered during this step, if any.
    pub entered: Option<GameStatus>,
}

impl Progress {
    fn none() -> Self {
        Self { entered: None }
    }

    fn to(status: GameStatus) -> Self {
        Self {
            entered: Some(status),
        }
    }
}

/// The full state of one game: members in join order, the current
/// phase, and the transient vote maps for the running phase.
pub struct GameState {
    id: GameId,
    rules: GameRules,
    status: GameStatus,
    players: Vec<Player>,
    /// Day votes: voter → target. Cleared at the phase boundary.
    day_votes: HashMap<Login, Login>,
    /// Night kill votes from Mafia members: voter → target.
    night_votes: HashMap<Login, Login>,
    /// Whether the Sheriff has used tonight's inspection.
    sheriff_done: bool,
    winner: Option<Team>,
}

impl GameState {
    /// Creates an empty game in `NotStarted`.
    pub fn new(id: GameId, rules: GameRules) -> Self {
        Self {
            id,
            rules,
            status: GameStatus::NotStarted,
            players: Vec::new(),
            day_votes: HashMap::new(),
            night_votes: HashMap::new(),
            sheriff_done: false,
            winner: None,
        }
    }

    pub fn id(&self) -> &GameId {
        &self.id
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn winner(&self) -> Option<Team> {
        self.winner
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, login: &Login) -> bool {
        self.player(login).is_some()
    }

    // -----------------------------------------------------------------
    // Lobby operations
    // -----------------------------------------------------------------

    /// Admits a player. Join order is preserved — it is significant for
    /// turn-based elements and for snapshot player lists.
    pub fn join(&mut self, login: Login) -> Result<(), GameError> {
        if self.status != GameStatus::NotStarted {
            return Err(GameError::GameInProgress(self.id.clone()));
        }
        if self.contains(&login) {
            return Err(GameError::AlreadyAssigned(login, self.id.clone()));
        }
        if self.players.len() >= self.rules.max_players {
            return Err(GameError::LobbyFull(self.id.clone()));
        }
        self.players.push(Player::new(login));
        Ok(())
    }

    /// Whether the auto-start threshold has been reached.
    pub fn ready_to_start(&self) -> bool {
        self.status == GameStatus::NotStarted
            && self.players.len() >= self.rules.min_players
    }

    /// Starts the game: assigns roles from a uniformly random
    /// permutation and enters the first Day.
    pub fn start(&mut self, rng: &mut impl Rng) -> Result<Progress, GameError> {
        if self.status != GameStatus::NotStarted {
            return Err(GameError::InvalidAction(format!(
                "game {} already started",
                self.id
            )));
        }
        if self.players.len() < self.rules.min_players {
            return Err(GameError::InvalidAction(format!(
                "need at least {} players, have {}",
                self.rules.min_players,
                self.players.len()
            )));
        }

        self.assign_roles(rng);
        self.status = GameStatus::Day;
        tracing::info!(
            game_id = %self.id,
            players = self.players.len(),
            mafia = self.rules.mafia_count(self.players.len()),
            "game started"
        );
        Ok(Progress::to(GameStatus::Day))
    }

    /// Removes a player.
    ///
    /// Before the start the slot is simply freed. In a running game the
    /// player is marked Ghost instead — a disconnect is not a free win —
    /// and the departure may resolve the current phase or end the game.
    pub fn remove_player(&mut self, login: &Login) -> Result<Progress, GameError> {
        let idx = self
            .players
            .iter()
            .position(|p| &p.login == login)
            .ok_or_else(|| {
                GameError::UnknownPlayer(login.clone(), self.id.clone())
            })?;

        match self.status {
            GameStatus::NotStarted | GameStatus::Ended => {
                self.players.remove(idx);
                Ok(Progress::none())
            }
            GameStatus::Day | GameStatus::Night => {
                let was_alive = self.players[idx].is_alive();
                self.players[idx].condition = Condition::Ghost;
                self.day_votes.remove(login);
                self.night_votes.remove(login);
                tracing::info!(
                    game_id = %self.id,
                    %login,
                    "player left mid-game, marked ghost"
                );

                if was_alive {
                    if let Some(team) = self.check_win() {
                        return Ok(self.finish(team));
                    }
                }
                // The departure may have been the last thing the phase
                // was waiting on.
                match self.status {
                    GameStatus::Day if self.all_living_voted() => {
                        self.resolve_day()
                    }
                    GameStatus::Night if self.night_complete() => {
                        self.resolve_night()
                    }
                    _ => Ok(Progress::none()),
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Phase actions
    // -----------------------------------------------------------------

    /// Records a Day vote. Re-voting overwrites the previous target.
    /// Resolves the Day as soon as every living player has voted.
    pub fn cast_vote(
        &mut self,
        voter: &Login,
        target: Login,
    ) -> Result<Progress, GameError> {
        self.require_phase(GameStatus::Day)?;
        self.require_living(voter)?;
        self.require_living_target(&target)?;

        self.day_votes.insert(voter.clone(), target);
        if self.all_living_voted() {
            self.resolve_day()
        } else {
            Ok(Progress::none())
        }
    }

    /// Records a Mafia kill vote for tonight.
    pub fn night_kill(
        &mut self,
        voter: &Login,
        target: Login,
    ) -> Result<Progress, GameError> {
        self.require_phase(GameStatus::Night)?;
        let player = self.require_living(voter)?;
        if player.role != Role::Mafia {
            return Err(GameError::InvalidAction(format!(
                "{voter} is not a Mafia member"
            )));
        }
        self.require_living_target(&target)?;

        self.night_votes.insert(voter.clone(), target);
        if self.night_complete() {
            self.resolve_night()
        } else {
            Ok(Progress::none())
        }
    }

    /// The Sheriff's single nightly inspection. The result is revealed
    /// through snapshot masking, only to the Sheriff.
    pub fn sheriff_check(
        &mut self,
        login: &Login,
        target: Login,
    ) -> Result<Progress, GameError> {
        self.require_phase(GameStatus::Night)?;
        let player = self.require_living(login)?;
        if player.role != Role::Sheriff {
            return Err(GameError::InvalidAction(format!(
                "{login} is not the Sheriff"
            )));
        }
        if self.sheriff_done {
            return Err(GameError::InvalidAction(
                "the Sheriff already inspected someone tonight".into(),
            ));
        }
        self.require_living_target(&target)?;

        let game_id = self.id.clone();
        let t = self
            .player_mut(&target)
            .ok_or_else(|| {
                GameError::UnknownPlayer(target.clone(), game_id)
            })?;
        t.checked_by_sheriff = true;
        self.sheriff_done = true;
        tracing::debug!(game_id = %self.id, target = %target, "sheriff inspection");

        if self.night_complete() {
            self.resolve_night()
        } else {
            Ok(Progress::none())
        }
    }

    /// Forces the current phase to resolve when its time budget elapses.
    ///
    /// `phase` is the phase the deadline was armed for; a stale deadline
    /// (the phase already advanced) is a no-op rather than an error.
    pub fn deadline_elapsed(
        &mut self,
        phase: GameStatus,
    ) -> Result<Progress, GameError> {
        if self.status != phase {
            return Ok(Progress::none());
        }
        match phase {
            GameStatus::Day => self.resolve_day(),
            GameStatus::Night => self.resolve_night(),
            _ => Ok(Progress::none()),
        }
    }

    // -----------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------

    /// Builds the snapshot a particular viewer is allowed to see.
    ///
    /// Roles are `Unknown` except: the viewer's own role, fellow Mafia
    /// to a Mafia viewer, inspected players to the Sheriff, everyone
    /// once the game has ended, and inspected players to everybody when
    /// the reveal policy is on.
    pub fn snapshot_for(&self, viewer: Option<&Login>) -> GameSnapshot {
        let viewer = viewer.and_then(|l| self.player(l));
        GameSnapshot {
            id: self.id.clone(),
            lobby_status: self.lobby_status(),
            game_status: self.status,
            players: self
                .players
                .iter()
                .map(|p| self.visible_info(viewer, p))
                .collect(),
            winner: self.winner,
        }
    }

    fn lobby_status(&self) -> LobbyStatus {
        if self.status != GameStatus::NotStarted
            || self.players.len() >= self.rules.max_players
        {
            LobbyStatus::Full
        } else {
            LobbyStatus::HasSlots
        }
    }

    fn visible_info(&self, viewer: Option<&Player>, about: &Player) -> PlayerInfo {
        let mut info = PlayerInfo {
            login: about.login.clone(),
            role: Role::Unknown,
            condition: about.condition,
            checked_by_sheriff: false,
        };

        if self.status == GameStatus::Ended {
            info.role = about.role;
            info.checked_by_sheriff = about.checked_by_sheriff;
            return info;
        }
        if self.rules.reveal_sheriff_checks
            && (about.role == Role::Sheriff || about.checked_by_sheriff)
        {
            info.role = about.role;
            info.checked_by_sheriff = about.checked_by_sheriff;
            return info;
        }
        let Some(viewer) = viewer else {
            return info;
        };
        if viewer.login == about.login {
            info.role = about.role;
            info.checked_by_sheriff = about.checked_by_sheriff;
        } else if viewer.role == Role::Mafia && about.role == Role::Mafia {
            info.role = about.role;
        } else if viewer.role == Role::Sheriff && about.checked_by_sheriff {
            info.role = about.role;
            info.checked_by_sheriff = true;
        }
        info
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn assign_roles(&mut self, rng: &mut impl Rng) {
        let mafia = self.rules.mafia_count(self.players.len());
        let mut order: Vec<usize> = (0..self.players.len()).collect();
        order.shuffle(rng);

        for (pos, &idx) in order.iter().enumerate() {
            self.players[idx].role = if pos < mafia {
                Role::Mafia
            } else if pos == mafia {
                Role::Sheriff
            } else {
                Role::Civilian
            };
        }
    }

    fn player(&self, login: &Login) -> Option<&Player> {
        self.players.iter().find(|p| &p.login == login)
    }

    fn player_mut(&mut self, login: &Login) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.login == login)
    }

    fn living(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_alive())
    }

    fn living_count(&self) -> usize {
        self.living().count()
    }

    fn living_mafia_count(&self) -> usize {
        self.living().filter(|p| p.role == Role::Mafia).count()
    }

    fn require_phase(&self, phase: GameStatus) -> Result<(), GameError> {
        if self.status != phase {
            return Err(GameError::InvalidAction(format!(
                "action only valid during {phase}, game is in {}",
                self.status
            )));
        }
        Ok(())
    }

    /// The acting player must be a living member.
    fn require_living(&self, login: &Login) -> Result<&Player, GameError> {
        let player = self.player(login).ok_or_else(|| {
            GameError::UnknownPlayer(login.clone(), self.id.clone())
        })?;
        if !player.is_alive() {
            return Err(GameError::InvalidAction(format!(
                "{login} is a ghost"
            )));
        }
        Ok(player)
    }

    /// Votes and night actions may only name living members.
    fn require_living_target(&self, target: &Login) -> Result<(), GameError> {
        let player = self.player(target).ok_or_else(|| {
            GameError::UnknownPlayer(target.clone(), self.id.clone())
        })?;
        if !player.is_alive() {
            return Err(GameError::InvalidAction(format!(
                "target {target} is already a ghost"
            )));
        }
        Ok(())
    }

    fn all_living_voted(&self) -> bool {
        self.living_count() > 0
            && self.living().all(|p| self.day_votes.contains_key(&p.login))
    }

    /// Night resolves early once every living Mafia member has voted a
    /// kill and the Sheriff (if alive) has inspected.
    fn night_complete(&self) -> bool {
        let mafia_done = self
            .living()
            .filter(|p| p.role == Role::Mafia)
            .all(|p| self.night_votes.contains_key(&p.login));
        let sheriff_done = self.sheriff_done
            || !self
                .living()
                .any(|p| p.role == Role::Sheriff);
        mafia_done && sheriff_done
    }

    /// The candidate with a strict majority among `electorate` voters,
    /// if any. A tie or a sub-majority plurality elects nobody.
    fn tally(votes: &HashMap<Login, Login>, electorate: usize) -> Option<Login> {
        let mut counts: HashMap<&Login, usize> = HashMap::new();
        for target in votes.values() {
            *counts.entry(target).or_default() += 1;
        }
        counts
            .into_iter()
            .find(|(_, n)| n * 2 > electorate)
            .map(|(login, _)| login.clone())
    }

    fn resolve_day(&mut self) -> Result<Progress, GameError> {
        let eliminated = Self::tally(&self.day_votes, self.living_count());
        self.day_votes.clear();

        if let Some(login) = eliminated {
            self.mark_ghost(&login);
            tracing::info!(game_id = %self.id, %login, "eliminated by day vote");
            if let Some(team) = self.check_win() {
                return Ok(self.finish(team));
            }
        } else {
            tracing::info!(game_id = %self.id, "day vote resolved with no elimination");
        }

        self.status = GameStatus::Night;
        self.night_votes.clear();
        self.sheriff_done = false;
        Ok(Progress::to(GameStatus::Night))
    }

    fn resolve_night(&mut self) -> Result<Progress, GameError> {
        let killed = Self::tally(&self.night_votes, self.living_mafia_count());
        self.night_votes.clear();

        if let Some(login) = killed {
            self.mark_ghost(&login);
            tracing::info!(game_id = %self.id, %login, "killed during the night");
            if let Some(team) = self.check_win() {
                return Ok(self.finish(team));
            }
        } else {
            tracing::info!(game_id = %self.id, "night resolved with no kill");
        }

        self.status = GameStatus::Day;
        self.day_votes.clear();
        Ok(Progress::to(GameStatus::Day))
    }

    fn mark_ghost(&mut self, login: &Login) {
        if let Some(player) = self.player_mut(login) {
            player.condition = Condition::Ghost;
        }
    }

    /// Win conditions, evaluated in order: no living Mafia → Town wins;
    /// living Mafia outnumber-or-equal the living rest → Mafia wins.
    fn check_win(&self) -> Option<Team> {
        let mafia = self.living_mafia_count();
        let others = self.living_count() - mafia;
        if mafia == 0 {
            Some(Team::Town)
        } else if mafia >= others {
            Some(Team::Mafia)
        } else {
            None
        }
    }

    fn finish(&mut self, team: Team) -> Progress {
        self.status = GameStatus::Ended;
        self.winner = Some(team);
        self.day_votes.clear();
        self.night_votes.clear();
        tracing::info!(game_id = %self.id, winner = ?team, "game ended");
        Progress::to(GameStatus::Ended)
    }
}

// =========================================================================
// Tests
// =========================================================================
