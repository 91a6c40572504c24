//! WebSocket protocol between participants and the hub.
//!
//! Every request carries a `request_id` that the hub echoes in its reply.
//! `Changed` is the only unsolicited message.

use serde::{Deserialize, Serialize};
use ttt_core::GameState;

use crate::error::SyncError;

/// Messages sent from a participant to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Fetch the current record
    Load { request_id: u64, game_id: String },

    /// Conditionally overwrite a record
    Save {
        request_id: u64,
        state: GameState,
        expected_version: u64,
    },

    /// Replace a record with a fresh board
    Reset { request_id: u64, game_id: String },

    /// Tell every subscriber of a game that it changed
    Publish { request_id: u64, game_id: String },

    /// Start receiving `Changed` for a game
    Subscribe { request_id: u64, game_id: String },

    /// Ping for keepalive
    Ping,
}

/// Messages sent from the hub to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Reply to `Load` and `Reset`
    Snapshot {
        request_id: u64,
        version: u64,
        state: GameState,
    },

    /// Reply to `Save`
    Saved { request_id: u64, version: u64 },

    /// Reply to `Publish` and `Subscribe`
    Ack { request_id: u64 },

    /// A request failed. `request_id` is absent when the request could not be parsed.
    Error {
        request_id: Option<u64>,
        error: SyncError,
    },

    /// A subscribed game changed
    Changed { game_id: String },

    /// Pong response
    Pong,
}

impl ServerMessage {
    /// The request this message answers, if any
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::Snapshot { request_id, .. }
            | ServerMessage::Saved { request_id, .. }
            | ServerMessage::Ack { request_id } => Some(*request_id),
            ServerMessage::Error { request_id, .. } => *request_id,
            ServerMessage::Changed { .. } | ServerMessage::Pong => None,
        }
    }
}
