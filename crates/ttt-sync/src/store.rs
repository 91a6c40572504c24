//! Persistence of game records by game id.
//!
//! Every write replaces the whole record. Each stored record carries a
//! version counter; `save` only succeeds when the caller's `expected_version`
//! still matches, so two participants that loaded the same state cannot both
//! write over it.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use ttt_core::GameState;

use crate::error::SyncError;

/// A record together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub state: GameState,
}

/// Load/save/reset access to shared game records.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current record for `game_id`, or `NotFound`
    async fn load(&self, game_id: &str) -> Result<Snapshot, SyncError>;

    /// Write `state` if the stored version is still `expected_version`.
    ///
    /// Returns the version now stored. Writing a record identical to the
    /// stored one changes nothing and returns the current version.
    async fn save(&self, state: &GameState, expected_version: u64) -> Result<u64, SyncError>;

    /// Unconditionally store a fresh board for `game_id`
    async fn reset(&self, game_id: &str) -> Result<Snapshot, SyncError>;
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn load(&self, game_id: &str) -> Result<Snapshot, SyncError> {
        (**self).load(game_id).await
    }

    async fn save(&self, state: &GameState, expected_version: u64) -> Result<u64, SyncError> {
        (**self).save(state, expected_version).await
    }

    async fn reset(&self, game_id: &str) -> Result<Snapshot, SyncError> {
        (**self).reset(game_id).await
    }
}

/// In-process store. Backs the hub and doubles as the test store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of games held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn load_record(&self, game_id: &str) -> Result<Snapshot, SyncError> {
        self.records
            .get(game_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SyncError::NotFound(game_id.to_string()))
    }

    pub fn save_record(&self, state: &GameState, expected_version: u64) -> Result<u64, SyncError> {
        state.validate()?;

        // The entry guard holds the shard lock, so check-and-write is atomic per key.
        let mut current = self
            .records
            .get_mut(&state.game_id)
            .ok_or_else(|| SyncError::NotFound(state.game_id.clone()))?;

        if current.state == *state {
            return Ok(current.version);
        }
        if current.version != expected_version {
            debug!(
                game_id = %state.game_id,
                expected_version,
                stored_version = current.version,
                "Rejecting stale write"
            );
            return Err(SyncError::Conflict {
                game_id: state.game_id.clone(),
                expected: expected_version,
            });
        }

        current.version += 1;
        current.state = state.clone();
        Ok(current.version)
    }

    pub fn reset_record(&self, game_id: &str) -> Result<Snapshot, SyncError> {
        let fresh = GameState::new(game_id);
        fresh.validate()?;

        let snapshot = match self.records.entry(game_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get_mut();
                if current.state != fresh {
                    current.version += 1;
                    current.state = fresh;
                }
                current.clone()
            }
            Entry::Vacant(entry) => entry
                .insert(Snapshot {
                    version: 1,
                    state: fresh,
                })
                .value()
                .clone(),
        };
        Ok(snapshot)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, game_id: &str) -> Result<Snapshot, SyncError> {
        self.load_record(game_id)
    }

    async fn save(&self, state: &GameState, expected_version: u64) -> Result<u64, SyncError> {
        self.save_record(state, expected_version)
    }

    async fn reset(&self, game_id: &str) -> Result<Snapshot, SyncError> {
        self.reset_record(game_id)
    }
}
