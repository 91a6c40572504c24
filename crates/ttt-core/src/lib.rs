//! Relayed tic-tac-toe - the shared game state machine
//!
//! This crate provides the core game logic, including:
//! - The persisted game record and its JSON shape
//! - Move validation, win and draw detection, turn order
//! - Simple automatic players
//!
//! # Architecture
//!
//! Nothing in here performs I/O. Participants coordinate through an external
//! store and a change channel (see the `ttt-sync` crate); this crate only
//! decides whether a move is legal and what the board looks like afterwards.
//!
//! # Modules
//!
//! - [`state`]: The `GameState` record, players and statuses
//! - [`engine`]: Move application and line detection
//! - [`bot`]: Automatic move selection

pub mod bot;
pub mod engine;
pub mod state;

// Re-export commonly used types
pub use bot::{Bot, BotDifficulty, ParseDifficultyError};
pub use engine::{is_board_full, winner, winning_line, GameError, MoveOutcome, LINES};
pub use state::{
    Cell, GameState, GameStatus, ParsePlayerError, Player, RecordError, BOARD_SIZE,
};
