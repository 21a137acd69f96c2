//! Game actor: an isolated Tokio task that owns one game.
//!
//! Each game runs in its own task, communicating with the outside world
//! through an mpsc channel. Commands are applied to the state machine
//! one at a time, so every tally and phase transition is computed from a
//! consistent view of the votes. Phase deadlines are armed inside the
//! actor and fed back into the state machine as deadline events.

use std::collections::HashMap;

use mafia_game::{GameError, GameRules, GameState, Progress};
use mafia_protocol::{GameId, GameSnapshot, GameStatus, Login};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::LobbyError;

/// Channel sender delivering masked snapshots to one subscriber.
pub type SnapshotSender = mpsc::UnboundedSender<GameSnapshot>;

/// Commands sent to a game actor through its channel.
///
/// The `oneshot::Sender` in each variant is a reply channel; the caller
/// sends a command and waits for the response on it.
pub(crate) enum GameCommand {
    /// Admit a player and attach their snapshot stream.
    Join {
        login: Login,
        sender: SnapshotSender,
        reply: oneshot::Sender<Result<(), GameError>>,
    },

    /// Remove a player (explicit exit or disconnect). Replies with the
    /// number of subscribers still attached, so the manager can tear
    /// down a deserted game.
    Exit {
        login: Login,
        reply: oneshot::Sender<Result<usize, GameError>>,
    },

    /// A Day vote.
    Vote {
        login: Login,
        target: Login,
        reply: oneshot::Sender<Result<(), GameError>>,
    },

    /// A Mafia kill vote.
    Kill {
        login: Login,
        target: Login,
        reply: oneshot::Sender<Result<(), GameError>>,
    },

    /// The Sheriff's nightly inspection.
    Inspect {
        login: Login,
        target: Login,
        reply: oneshot::Sender<Result<(), GameError>>,
    },

    /// Request current game metadata.
    Info {
        reply: oneshot::Sender<TableInfo>,
    },

    /// Shut down the actor.
    Shutdown,
}

/// A snapshot of game metadata (not the game state itself).
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub game_id: GameId,
    pub status: GameStatus,
    pub players: usize,
    pub subscribers: usize,
}

/// Handle to a running game actor. Cheap to clone; the lobby manager
/// holds one per game.
#[derive(Debug, Clone)]
pub struct GameHandle {
    game_id: GameId,
    sender: mpsc::Sender<GameCommand>,
}

impl GameHandle {
    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    /// Admits a player and subscribes them to the snapshot stream.
    pub async fn join(
        &self,
        login: Login,
        sender: SnapshotSender,
    ) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GameCommand::Join {
                login,
                sender,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LobbyError::Unavailable(self.game_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.game_id.clone()))?
            .map_err(LobbyError::from)
    }

    /// Removes a player. Returns the number of subscribers left.
    pub async fn exit(&self, login: Login) -> Result<usize, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GameCommand::Exit {
                login,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LobbyError::Unavailable(self.game_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.game_id.clone()))?
            .map_err(LobbyError::from)
    }

    pub async fn vote(&self, login: Login, target: Login) -> Result<(), LobbyError> {
        self.action(|reply| GameCommand::Vote {
            login,
            target,
            reply,
        })
        .await
    }

    pub async fn kill(&self, login: Login, target: Login) -> Result<(), LobbyError> {
        self.action(|reply| GameCommand::Kill {
            login,
            target,
            reply,
        })
        .await
    }

    pub async fn inspect(&self, login: Login, target: Login) -> Result<(), LobbyError> {
        self.action(|reply| GameCommand::Inspect {
            login,
            target,
            reply,
        })
        .await
    }

    /// Requests current game metadata.
    pub async fn info(&self) -> Result<TableInfo, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(GameCommand::Info { reply: reply_tx })
            .await
            .map_err(|_| LobbyError::Unavailable(self.game_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.game_id.clone()))
    }

    /// Tells the actor to shut down.
    pub async fn shutdown(&self) -> Result<(), LobbyError> {
        self.sender
            .send(GameCommand::Shutdown)
            .await
            .map_err(|_| LobbyError::Unavailable(self.game_id.clone()))
    }

    async fn action(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), GameError>>) -> GameCommand,
    ) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| LobbyError::Unavailable(self.game_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.game_id.clone()))?
            .map_err(LobbyError::from)
    }
}

/// The internal game actor. Runs inside a Tokio task.
struct GameActor {
    state: GameState,
    /// Per-subscriber outbound channels, keyed by login.
    subscribers: HashMap<Login, SnapshotSender>,
    receiver: mpsc::Receiver<GameCommand>,
    /// The armed phase deadline: which phase it was armed for, and when
    /// it fires. A stale entry is harmless, the state machine treats a
    /// deadline for an already-departed phase as a no-op.
    deadline: Option<(GameStatus, Instant)>,
}

impl GameActor {
    async fn run(mut self) {
        tracing::info!(game_id = %self.state.id(), "game actor started");

        loop {
            let deadline = self.deadline;
            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle(cmd) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = phase_timer(deadline) => {
                    self.on_deadline();
                }
            }
        }

        tracing::info!(game_id = %self.state.id(), "game actor stopped");
    }

    /// Applies one command. Returns `true` when the actor should stop.
    fn handle(&mut self, cmd: GameCommand) -> bool {
        match cmd {
            GameCommand::Join {
                login,
                sender,
                reply,
            } => {
                let result = self.handle_join(login, sender);
                let _ = reply.send(result);
            }
            GameCommand::Exit { login, reply } => {
                let result = self.handle_exit(&login);
                let _ = reply.send(result);
            }
            GameCommand::Vote {
                login,
                target,
                reply,
            } => {
                let result = self.apply(|state| state.cast_vote(&login, target));
                let _ = reply.send(result);
            }
            GameCommand::Kill {
                login,
                target,
                reply,
            } => {
                let result = self.apply(|state| state.night_kill(&login, target));
                let _ = reply.send(result);
            }
            GameCommand::Inspect {
                login,
                target,
                reply,
            } => {
                let result = self.apply(|state| state.sheriff_check(&login, target));
                let _ = reply.send(result);
            }
            GameCommand::Info { reply } => {
                let _ = reply.send(TableInfo {
                    game_id: self.state.id().clone(),
                    status: self.state.status(),
                    players: self.state.player_count(),
                    subscribers: self.subscribers.len(),
                });
            }
            GameCommand::Shutdown => {
                tracing::info!(game_id = %self.state.id(), "game shutting down");
                return true;
            }
        }
        false
    }

    fn handle_join(
        &mut self,
        login: Login,
        sender: SnapshotSender,
    ) -> Result<(), GameError> {
        self.state.join(login.clone())?;
        self.subscribers.insert(login.clone(), sender);
        tracing::info!(
            game_id = %self.state.id(),
            %login,
            players = self.state.player_count(),
            "player joined"
        );

        // Auto-start once the minimum head-count is reached.
        if self.state.ready_to_start() {
            let progress = self.state.start(&mut rand::rng())?;
            self.arm(progress);
        }

        self.broadcast();
        Ok(())
    }

    fn handle_exit(&mut self, login: &Login) -> Result<usize, GameError> {
        let progress = self.state.remove_player(login)?;
        self.subscribers.remove(login);
        self.arm(progress);
        self.broadcast();
        tracing::info!(
            game_id = %self.state.id(),
            %login,
            subscribers = self.subscribers.len(),
            "player left"
        );
        Ok(self.subscribers.len())
    }

    /// Runs one state-machine mutation and, on success, fans out fresh
    /// snapshots and re-arms the phase timer. A rejected action leaves
    /// the game untouched, so nothing is broadcast.
    fn apply(
        &mut self,
        op: impl FnOnce(&mut GameState) -> Result<Progress, GameError>,
    ) -> Result<(), GameError> {
        let progress = op(&mut self.state)?;
        self.arm(progress);
        self.broadcast();
        Ok(())
    }

    fn on_deadline(&mut self) {
        let Some((phase, _)) = self.deadline.take() else {
            return;
        };
        tracing::debug!(game_id = %self.state.id(), %phase, "phase deadline elapsed");
        match self.state.deadline_elapsed(phase) {
            Ok(progress) => {
                self.arm(progress);
                self.broadcast();
            }
            Err(err) => {
                tracing::error!(game_id = %self.state.id(), %err, "deadline resolution failed");
            }
        }
    }

    /// Re-arms the phase timer when a mutation entered a new phase.
    fn arm(&mut self, progress: Progress) {
        let Some(phase) = progress.entered else {
            return;
        };
        let budget = match phase {
            GameStatus::Day => Some(self.state.rules().day_budget),
            GameStatus::Night => Some(self.state.rules().night_budget),
            GameStatus::NotStarted | GameStatus::Ended => None,
        };
        self.deadline = budget.map(|b| (phase, Instant::now() + b));
    }

    /// Sends each subscriber the snapshot masked for them. A subscriber
    /// whose channel is gone is dropped; their game membership is
    /// cleaned up separately through the disconnect path.
    fn broadcast(&mut self) {
        let mut dead = Vec::new();
        for (login, sender) in &self.subscribers {
            let snapshot = self.state.snapshot_for(Some(login));
            if sender.send(snapshot).is_err() {
                dead.push(login.clone());
            }
        }
        for login in dead {
            tracing::debug!(
                game_id = %self.state.id(),
                %login,
                "dropping dead subscriber"
            );
            self.subscribers.remove(&login);
        }
    }
}

/// Sleeps until the armed deadline, or forever when no phase is timed.
async fn phase_timer(deadline: Option<(GameStatus, Instant)>) {
    match deadline {
        Some((_, at)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Spawns a new game actor task and returns a handle to it.
///
/// `channel_size` bounds the command channel; senders wait when it is
/// full.
pub(crate) fn spawn_table(
    game_id: GameId,
    rules: GameRules,
    channel_size: usize,
) -> GameHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let actor = GameActor {
        state: GameState::new(game_id.clone(), rules),
        subscribers: HashMap::new(),
        receiver: rx,
        deadline: None,
    };

    tokio::spawn(actor.run());

    GameHandle {
        game_id,
        sender: tx,
    }
}
