//! Lobby manager: creates, tracks, and routes players to games.

use std::collections::HashMap;

use mafia_game::{GameError, GameRules};
use mafia_protocol::{GameId, Login};
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::table::spawn_table;
use crate::{GameHandle, LobbyError, SnapshotSender, TableInfo};

/// Length of server-generated game ids.
const GAME_ID_LEN: usize = 8;

/// Default command channel size for game actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Owns the live set of games and the player-to-game index.
///
/// This is the entry point for game operations from the connection
/// layer. A player is in at most one game at a time (key invariant);
/// all mutations route through the index.
pub struct LobbyManager {
    rules: GameRules,
    /// Active games, keyed by game id.
    games: HashMap<GameId, GameHandle>,
    /// Maps each player to the game they are in.
    memberships: HashMap<Login, GameId>,
}

impl LobbyManager {
    pub fn new(rules: GameRules) -> Self {
        Self {
            rules,
            games: HashMap::new(),
            memberships: HashMap::new(),
        }
    }

    /// Stage one of a join: enforces the one-game-per-player invariant,
    /// creates the game if absent, and reserves the membership slot.
    ///
    /// Returns an owned handle so a caller that guards this manager with
    /// a lock can release it before awaiting the actor. A rejected join
    /// must be rolled back with [`abort_join`](Self::abort_join).
    pub fn begin_join(
        &mut self,
        login: Login,
        game_id: Option<GameId>,
    ) -> Result<GameHandle, LobbyError> {
        if let Some(current) = self.memberships.get(&login) {
            return Err(GameError::AlreadyAssigned(login, current.clone()).into());
        }

        let game_id = match game_id {
            Some(id) => id,
            None => self.generate_game_id(),
        };

        let handle = match self.games.get(&game_id) {
            Some(handle) => handle.clone(),
            None => {
                let handle = spawn_table(
                    game_id.clone(),
                    self.rules.clone(),
                    DEFAULT_CHANNEL_SIZE,
                );
                self.games.insert(game_id.clone(), handle.clone());
                tracing::info!(%game_id, "game created");
                handle
            }
        };

        self.memberships.insert(login, game_id);
        Ok(handle)
    }

    /// Rolls back a reservation after the actor rejected the join. A
    /// dead actor also forfeits its directory entry so a later join can
    /// recreate the id.
    pub fn abort_join(&mut self, login: &Login, err: &LobbyError) {
        if let Some(game_id) = self.memberships.remove(login) {
            if matches!(err, LobbyError::Unavailable(_)) {
                self.games.remove(&game_id);
            }
        }
    }

    /// Admits a player into a game and attaches their snapshot stream.
    ///
    /// A missing game is created first (join-creates-if-absent); with no
    /// id given, the server generates one. Returns the id of the game
    /// actually joined.
    pub async fn join_game(
        &mut self,
        login: Login,
        game_id: Option<GameId>,
        sender: SnapshotSender,
    ) -> Result<GameId, LobbyError> {
        let handle = self.begin_join(login.clone(), game_id)?;
        match handle.join(login.clone(), sender).await {
            Ok(()) => Ok(handle.game_id().clone()),
            Err(err) => {
                self.abort_join(&login, &err);
                Err(err)
            }
        }
    }

    /// Stage one of an exit: unlinks the player from the index and
    /// returns an owned handle to their former game, to be awaited
    /// without holding the manager.
    pub fn begin_exit(&mut self, login: &Login) -> Result<GameHandle, LobbyError> {
        let game_id = self
            .memberships
            .remove(login)
            .ok_or_else(|| LobbyError::NotInGame(login.clone()))?;
        self.games
            .get(&game_id)
            .cloned()
            .ok_or(LobbyError::NotFound(game_id))
    }

    /// Removes a player from their current game. A game left with no
    /// subscribers is torn down.
    pub async fn exit_game(&mut self, login: &Login) -> Result<(), LobbyError> {
        let handle = self.begin_exit(login)?;
        match handle.exit(login.clone()).await {
            Ok(0) => {
                self.destroy_game(handle.game_id()).await;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(err @ LobbyError::Unavailable(_)) => {
                self.destroy_game(handle.game_id()).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Disconnect cleanup: exit-as-disconnect for a session that closed
    /// without an explicit `ExitGame`. Tolerant of a player who was not
    /// in any game.
    pub async fn disconnect(&mut self, login: &Login) {
        match self.exit_game(login).await {
            Ok(()) | Err(LobbyError::NotInGame(_)) => {}
            Err(err) => {
                tracing::warn!(%login, %err, "disconnect cleanup failed");
            }
        }
    }

    /// Owned handle to the player's current game. Callers that guard
    /// the manager with a lock clone the handle under it and await the
    /// actor unlocked, so one game's round-trip never stalls another's.
    pub fn game_handle(&self, login: &Login) -> Result<GameHandle, LobbyError> {
        let game_id = self
            .memberships
            .get(login)
            .ok_or_else(|| LobbyError::NotInGame(login.clone()))?;
        self.games
            .get(game_id)
            .cloned()
            .ok_or_else(|| LobbyError::NotFound(game_id.clone()))
    }

    /// Routes a Day vote to the voter's game.
    pub async fn cast_vote(
        &self,
        login: &Login,
        target: Login,
    ) -> Result<(), LobbyError> {
        self.game_handle(login)?.vote(login.clone(), target).await
    }

    /// Routes a Mafia kill vote to the voter's game.
    pub async fn night_kill(
        &self,
        login: &Login,
        target: Login,
    ) -> Result<(), LobbyError> {
        self.game_handle(login)?.kill(login.clone(), target).await
    }

    /// Routes a Sheriff inspection to the player's game.
    pub async fn sheriff_check(
        &self,
        login: &Login,
        target: Login,
    ) -> Result<(), LobbyError> {
        self.game_handle(login)?.inspect(login.clone(), target).await
    }

    /// Non-creating lookup of a game's metadata.
    pub async fn game_info(&self, game_id: &GameId) -> Result<TableInfo, LobbyError> {
        let handle = self
            .games
            .get(game_id)
            .ok_or_else(|| LobbyError::NotFound(game_id.clone()))?;
        handle.info().await
    }

    /// The game a player is currently in, if any.
    pub fn membership(&self, login: &Login) -> Option<&GameId> {
        self.memberships.get(login)
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    /// Shuts a game down and clears its members from the index.
    pub async fn destroy_game(&mut self, game_id: &GameId) {
        if let Some(handle) = self.games.remove(game_id) {
            let _ = handle.shutdown().await;
        }
        self.memberships.retain(|_, id| id != game_id);
        tracing::info!(%game_id, "game destroyed");
    }

    /// An 8-character alphanumeric id not currently in use.
    fn generate_game_id(&self) -> GameId {
        let mut rng = rand::rng();
        loop {
            let id: String = (&mut rng)
                .sample_iter(Alphanumeric)
                .take(GAME_ID_LEN)
                .map(char::from)
                .collect();
            let id = GameId(id);
            if !self.games.contains_key(&id) {
                return id;
            }
        }
    }
}
