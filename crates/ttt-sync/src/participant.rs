//! The reactive loop each participant runs.
//!
//! ```text
//! FETCHING -> RENDER -> GAME_OVER | WAITING_OPPONENT | MY_TURN
//! MY_TURN  -> APPLYING -> RENDER            (accepted, published)
//!                      -> MY_TURN           (rule violation or bad input)
//!                      -> FETCHING          (someone else wrote first)
//! GAME_OVER | WAITING_OPPONENT | after APPLYING -> wait for notification -> FETCHING
//! ```
//!
//! The subscription is opened before the first fetch, so a change that lands
//! between the two still wakes the loop.

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, info, warn};
use ttt_core::{Bot, BotDifficulty, GameState, GameStatus, Player};

use crate::error::SyncError;
use crate::notifier::{ChangeNotifier, NotificationStream};
use crate::service::{GameService, MoveResult};
use crate::store::StateStore;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetching,
    Render,
    GameOver,
    WaitingOpponent,
    MyTurn,
    Applying,
}

/// Things the loop reports to whoever is displaying it
#[derive(Debug)]
pub enum LoopEvent<'a> {
    /// A fresh view of the board
    State(&'a GameState),
    /// Opponent's move; going to sleep until the next notification
    Waiting,
    /// The round is finished
    GameOver(GameStatus),
    MoveAccepted { player: Player, index: usize },
    MoveRejected(&'a SyncError),
    /// Woken by a notification
    UpdateReceived,
}

/// Display side of the loop
pub trait Renderer: Send {
    fn show(&mut self, event: LoopEvent<'_>);
}

/// Supplies the local participant's moves.
#[async_trait]
pub trait MoveSource: Send {
    /// Next move for `player` on `state`.
    ///
    /// `Ok(None)` means the input is exhausted and the loop should stop.
    /// `Err(MalformedInput)` is reported and the player is asked again.
    async fn next_move(&mut self, state: &GameState, player: Player) -> Result<Option<usize>, SyncError>;
}

/// Parse one line of move input
pub fn parse_move(input: &str) -> Result<usize, SyncError> {
    let input = input.trim();
    if input.is_empty() || !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(SyncError::MalformedInput(format!(
            "expected a cell number 0-8, got {input:?}"
        )));
    }
    input
        .parse()
        .map_err(|_| SyncError::MalformedInput(format!("cell number {input:?} is too large")))
}

/// Moves chosen by a `Bot`
pub struct BotSource {
    bot: Bot,
}

impl BotSource {
    pub fn new(player: Player, difficulty: BotDifficulty) -> Self {
        Self {
            bot: Bot::new(player, difficulty),
        }
    }

    pub fn with_seed(player: Player, difficulty: BotDifficulty, seed: u64) -> Self {
        Self {
            bot: Bot::with_seed(player, difficulty, seed),
        }
    }
}

#[async_trait]
impl MoveSource for BotSource {
    async fn next_move(&mut self, state: &GameState, _player: Player) -> Result<Option<usize>, SyncError> {
        Ok(self.bot.choose_move(state))
    }
}

/// How a round of the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEnd {
    /// Sleep until the next notification
    Wait,
    /// The move source has nothing more to give
    InputClosed,
}

enum TurnEnd {
    Applied,
    Refetch,
    InputClosed,
}

/// One participant's view of one shared game.
pub struct ParticipantLoop<S, N, M, R> {
    game_id: String,
    player: Player,
    service: GameService<S>,
    notifier: N,
    input: M,
    renderer: R,
    phase: Phase,
}

impl<S, N, M, R> ParticipantLoop<S, N, M, R>
where
    S: StateStore,
    N: ChangeNotifier,
    M: MoveSource,
    R: Renderer,
{
    pub fn new(
        game_id: impl Into<String>,
        player: Player,
        store: S,
        notifier: N,
        input: M,
        renderer: R,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            player,
            service: GameService::new(store),
            notifier,
            input,
            renderer,
            phase: Phase::Fetching,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Open the subscription this loop waits on
    pub async fn subscribe(&self) -> Result<NotificationStream, SyncError> {
        self.notifier.subscribe(&self.game_id).await
    }

    /// Run until the input runs out or the transport fails
    pub async fn run(mut self) -> Result<(), SyncError> {
        let mut updates = self.subscribe().await?;
        info!(game_id = %self.game_id, player = %self.player, "Participant loop started");

        loop {
            if self.round().await? == RoundEnd::InputClosed {
                info!(game_id = %self.game_id, "Move input closed, leaving game");
                return Ok(());
            }
            self.wait(&mut updates).await?;
        }
    }

    /// Block until the next notification arrives
    pub async fn wait(&mut self, updates: &mut NotificationStream) -> Result<(), SyncError> {
        match updates.next().await {
            Some(Ok(_)) => {
                debug!(game_id = %self.game_id, "Update received");
                self.renderer.show(LoopEvent::UpdateReceived);
                self.phase = Phase::Fetching;
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Err(SyncError::Transport("notification stream ended".into())),
        }
    }

    /// FETCHING through to the next point where the loop must wait
    pub async fn round(&mut self) -> Result<RoundEnd, SyncError> {
        loop {
            self.phase = Phase::Fetching;
            let state = self.service.get_state(&self.game_id).await?;

            self.phase = Phase::Render;
            self.renderer.show(LoopEvent::State(&state));

            if state.is_over() {
                self.finish(state.status);
                return Ok(RoundEnd::Wait);
            }
            if !state.is_turn_of(self.player) {
                self.phase = Phase::WaitingOpponent;
                self.renderer.show(LoopEvent::Waiting);
                return Ok(RoundEnd::Wait);
            }

            match self.take_turn(state).await? {
                TurnEnd::Applied => return Ok(RoundEnd::Wait),
                TurnEnd::Refetch => continue,
                TurnEnd::InputClosed => return Ok(RoundEnd::InputClosed),
            }
        }
    }

    fn finish(&mut self, status: GameStatus) {
        self.phase = Phase::GameOver;
        self.renderer.show(LoopEvent::GameOver(status));
    }

    async fn take_turn(&mut self, mut state: GameState) -> Result<TurnEnd, SyncError> {
        loop {
            self.phase = Phase::MyTurn;
            let index = match self.input.next_move(&state, self.player).await {
                Ok(Some(index)) => index,
                Ok(None) => return Ok(TurnEnd::InputClosed),
                Err(e) if e.is_validation() => {
                    self.renderer.show(LoopEvent::MoveRejected(&e));
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.phase = Phase::Applying;
            match self.service.make_move(&self.game_id, self.player, index).await {
                Ok(MoveResult::Accepted { state: next, .. }) => {
                    self.notifier.publish(&self.game_id).await?;
                    self.renderer.show(LoopEvent::MoveAccepted {
                        player: self.player,
                        index,
                    });

                    self.phase = Phase::Render;
                    self.renderer.show(LoopEvent::State(&next));
                    if next.is_over() {
                        self.finish(next.status);
                    } else {
                        self.phase = Phase::WaitingOpponent;
                        self.renderer.show(LoopEvent::Waiting);
                    }
                    return Ok(TurnEnd::Applied);
                }
                Ok(MoveResult::Rejected { reason }) => {
                    self.renderer
                        .show(LoopEvent::MoveRejected(&SyncError::Rejected(reason)));

                    // The store may have moved on since `state` was read
                    let fresh = self.service.get_state(&self.game_id).await?;
                    if fresh != state {
                        return Ok(TurnEnd::Refetch);
                    }
                    state = fresh;
                }
                Err(SyncError::Conflict { .. }) => {
                    warn!(game_id = %self.game_id, "Record changed underneath the move, refetching");
                    return Ok(TurnEnd::Refetch);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Spectator loop: render every change, never move.
///
/// Waits quietly while the game does not exist yet.
pub async fn watch<S, N, R>(game_id: &str, store: S, notifier: N, mut renderer: R) -> Result<(), SyncError>
where
    S: StateStore,
    N: ChangeNotifier,
    R: Renderer,
{
    let mut updates = notifier.subscribe(game_id).await?;
    let service = GameService::new(store);
    info!(%game_id, "Watching game");

    loop {
        match service.get_state(game_id).await {
            Ok(state) => {
                renderer.show(LoopEvent::State(&state));
                if state.is_over() {
                    renderer.show(LoopEvent::GameOver(state.status));
                }
            }
            Err(SyncError::NotFound(_)) => debug!(%game_id, "Game does not exist yet"),
            Err(e) => return Err(e),
        }

        match updates.next().await {
            Some(Ok(_)) => renderer.show(LoopEvent::UpdateReceived),
            Some(Err(e)) => return Err(e),
            None => return Err(SyncError::Transport("notification stream ended".into())),
        }
    }
}
