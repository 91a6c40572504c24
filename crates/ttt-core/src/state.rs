//! The shared game record.
//!
//! A `GameState` is the whole truth about one board. Participants never hold
//! anything else: they load it, mutate it through the engine, and write it
//! back as one unit. The serde representation is the persisted record format:
//!
//! ```json
//! {"game_id": "g1", "state": "is_playing", "player_turn": "x",
//!  "positions": ["", "", "", "", "x", "", "", "", ""]}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::engine;

/// Number of cells on the board
pub const BOARD_SIZE: usize = 9;

/// One of the two player symbols. X always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    X,
    O,
}

impl Player {
    pub const ALL: [Player; 2] = [Player::X, Player::O];

    /// The other player
    pub fn opponent(self) -> Player {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
        }
    }

    /// Lowercase symbol used in records
    pub fn as_str(self) -> &'static str {
        match self {
            Player::X => "x",
            Player::O => "o",
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a player symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown player symbol {0:?} (expected \"x\" or \"o\")")]
pub struct ParsePlayerError(pub String);

impl FromStr for Player {
    type Err = ParsePlayerError;

    /// Accepts either case; records themselves are always lowercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "x" | "X" => Ok(Player::X),
            "o" | "O" => Ok(Player::O),
            other => Err(ParsePlayerError(other.to_string())),
        }
    }
}

/// Game status. Once it leaves `InProgress` it never goes back, short of a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    #[serde(rename = "is_playing")]
    InProgress,
    #[serde(rename = "x wins!")]
    WonByX,
    #[serde(rename = "o wins!")]
    WonByO,
    #[serde(rename = "draw")]
    Draw,
}

impl GameStatus {
    pub fn won_by(player: Player) -> GameStatus {
        match player {
            Player::X => GameStatus::WonByX,
            Player::O => GameStatus::WonByO,
        }
    }

    pub fn is_over(self) -> bool {
        self != GameStatus::InProgress
    }

    pub fn winner(self) -> Option<Player> {
        match self {
            GameStatus::WonByX => Some(Player::X),
            GameStatus::WonByO => Some(Player::O),
            GameStatus::InProgress | GameStatus::Draw => None,
        }
    }

    /// The record string for this status
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::InProgress => "is_playing",
            GameStatus::WonByX => "x wins!",
            GameStatus::WonByO => "o wins!",
            GameStatus::Draw => "draw",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A board slot
pub type Cell = Option<Player>;

/// Ways a loaded record can contradict the rules of the game.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Mark counts out of balance: {x} x, {o} o")]
    UnbalancedMarks { x: usize, o: usize },

    #[error("Turn is {turn} but mark counts say otherwise")]
    WrongTurn { turn: Player },

    #[error("Status is {status} but the board says {actual}")]
    StatusMismatch {
        status: GameStatus,
        actual: GameStatus,
    },

    #[error("Empty game id")]
    EmptyGameId,
}

/// The complete state of one shared board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Identifies the shared game; never changes
    pub game_id: String,
    /// Current status
    #[serde(rename = "state")]
    pub status: GameStatus,
    /// Whose move it is (only meaningful while in progress)
    #[serde(rename = "player_turn")]
    pub turn: Player,
    /// Board slots in row-major order
    #[serde(rename = "positions", with = "positions")]
    pub cells: [Cell; BOARD_SIZE],
}

impl GameState {
    /// Fresh board: all empty, x to move
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            status: GameStatus::InProgress,
            turn: Player::X,
            cells: [None; BOARD_SIZE],
        }
    }

    /// Number of cells held by `player`
    pub fn count(&self, player: Player) -> usize {
        self.cells.iter().filter(|c| **c == Some(player)).count()
    }

    pub fn is_over(&self) -> bool {
        self.status.is_over()
    }

    /// Parse a persisted record
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to the persisted record format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Check that a record could have been produced by legal play.
    ///
    /// Records arrive from outside the process, so stores call this before
    /// accepting one.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.game_id.is_empty() {
            return Err(RecordError::EmptyGameId);
        }

        let x = self.count(Player::X);
        let o = self.count(Player::O);
        if x != o && x != o + 1 {
            return Err(RecordError::UnbalancedMarks { x, o });
        }

        let actual = match engine::winner(&self.cells) {
            Some(player) => GameStatus::won_by(player),
            None if engine::is_board_full(&self.cells) => GameStatus::Draw,
            None => GameStatus::InProgress,
        };
        if actual != self.status {
            return Err(RecordError::StatusMismatch {
                status: self.status,
                actual,
            });
        }

        // x is to move whenever the counts are level.
        let expected_turn = if x == o { Player::X } else { Player::O };
        match self.status {
            GameStatus::InProgress if self.turn != expected_turn => {
                Err(RecordError::WrongTurn { turn: self.turn })
            }
            GameStatus::WonByX if x != o + 1 => Err(RecordError::UnbalancedMarks { x, o }),
            GameStatus::WonByO if x != o => Err(RecordError::UnbalancedMarks { x, o }),
            _ => Ok(()),
        }
    }
}

/// Serde adapter for `positions`: exactly nine strings, each `""`, `"x"` or `"o"`.
mod positions {
    use super::{Cell, Player, BOARD_SIZE};
    use serde::de::{self, Deserializer};
    use serde::ser::Serializer;
    use serde::{Deserialize, Serialize};

    pub fn serialize<S: Serializer>(cells: &[Cell; BOARD_SIZE], serializer: S) -> Result<S::Ok, S::Error> {
        let symbols: [&str; BOARD_SIZE] = (*cells).map(|cell| cell.map_or("", Player::as_str));
        symbols.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[Cell; BOARD_SIZE], D::Error> {
        let raw: Vec<String> = Vec::deserialize(deserializer)?;
        if raw.len() != BOARD_SIZE {
            return Err(de::Error::invalid_length(raw.len(), &"exactly 9 positions"));
        }

        let mut cells = [None; BOARD_SIZE];
        for (cell, symbol) in cells.iter_mut().zip(&raw) {
            *cell = match symbol.as_str() {
                "" => None,
                "x" => Some(Player::X),
                "o" => Some(Player::O),
                other => {
                    return Err(de::Error::invalid_value(
                        de::Unexpected::Str(other),
                        &"\"\", \"x\" or \"o\"",
                    ))
                }
            };
        }
        Ok(cells)
    }
}
