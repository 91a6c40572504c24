//! Query surface over a store: get state, make a move, reset.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ttt_core::{GameError, GameState, MoveOutcome, Player};

use crate::error::SyncError;
use crate::store::StateStore;

/// Result of a move request that reached the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MoveResult {
    Accepted {
        state: GameState,
        outcome: MoveOutcome,
    },
    Rejected {
        reason: GameError,
    },
}

impl MoveResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MoveResult::Accepted { .. })
    }
}

/// Game operations backed by a `StateStore`.
pub struct GameService<S> {
    store: S,
}

impl<S: StateStore> GameService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current record, or `NotFound`
    pub async fn get_state(&self, game_id: &str) -> Result<GameState, SyncError> {
        Ok(self.store.load(game_id).await?.state)
    }

    /// Load, validate and apply a move, then write it back.
    ///
    /// Rule violations come back as `Ok(MoveResult::Rejected)` and write
    /// nothing. If another writer got in between the load and the save, the
    /// store's version check fails and this returns `Err(Conflict)`.
    pub async fn make_move(
        &self,
        game_id: &str,
        player: Player,
        index: usize,
    ) -> Result<MoveResult, SyncError> {
        let snapshot = self.store.load(game_id).await?;

        let (state, outcome) = match snapshot.state.with_move(player, index) {
            Ok(applied) => applied,
            Err(reason) => {
                debug!(%game_id, %player, index, %reason, "Move rejected");
                return Ok(MoveResult::Rejected { reason });
            }
        };

        let version = self.store.save(&state, snapshot.version).await?;
        info!(%game_id, %player, index, version, status = %state.status, "Move accepted");
        Ok(MoveResult::Accepted { state, outcome })
    }

    /// Put a fresh board in place of whatever was there
    pub async fn reset(&self, game_id: &str) -> Result<GameState, SyncError> {
        let snapshot = self.store.reset(game_id).await?;
        info!(%game_id, version = snapshot.version, "Game reset");
        Ok(snapshot.state)
    }
}
