//! Errors raised while reading, writing or relaying a shared game.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ttt_core::{GameError, RecordError};

/// Everything that can go wrong between a participant and the shared record.
///
/// Serializable so the hub can send it back over the wire unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SyncError {
    #[error("Game not found: {0}")]
    NotFound(String),

    /// The record was written by someone else after it was loaded
    #[error("Game {game_id} changed since version {expected}")]
    Conflict { game_id: String, expected: u64 },

    #[error(transparent)]
    Rejected(#[from] GameError),

    #[error("Invalid input: {0}")]
    MalformedInput(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Transport failure: {0}")]
    Transport(String),
}

impl SyncError {
    /// Errors the local participant can recover from by trying another move
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Rejected(_) | SyncError::MalformedInput(_))
    }
}

impl From<RecordError> for SyncError {
    fn from(e: RecordError) -> Self {
        SyncError::InvalidRecord(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Transport(format!("bad message: {e}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}
