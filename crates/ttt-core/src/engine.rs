//! Move validation and application.
//!
//! Everything here is pure: the engine never persists or notifies. Callers
//! load a `GameState`, apply a move, and decide what to do with the result.

use crate::state::{Cell, GameState, GameStatus, Player, BOARD_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The 8 winning triples: 3 rows, 3 columns, 2 diagonals
pub const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Reasons a move is rejected. None of them changes the board.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("Not your turn")]
    NotYourTurn,

    #[error("Game is over")]
    GameAlreadyOver,

    #[error("Index must be between 0 and 8, got {0}")]
    IndexOutOfRange(usize),

    #[error("Position {0} already taken")]
    CellOccupied(usize),
}

/// What an accepted move did to the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveOutcome {
    /// Turn passed to the opponent
    Continue,
    /// The mover completed a line
    Won(Player),
    /// Board filled with no line
    Draw,
}

/// Player holding a complete line, if any
pub fn winner(cells: &[Cell; BOARD_SIZE]) -> Option<Player> {
    winning_line(cells).and_then(|[a, _, _]| cells[a])
}

/// The first complete line on the board
pub fn winning_line(cells: &[Cell; BOARD_SIZE]) -> Option<[usize; 3]> {
    LINES.into_iter().find(|&[a, b, c]| {
        cells[a].is_some() && cells[a] == cells[b] && cells[a] == cells[c]
    })
}

pub fn is_board_full(cells: &[Cell; BOARD_SIZE]) -> bool {
    cells.iter().all(Option::is_some)
}

fn completes_line(cells: &[Cell; BOARD_SIZE], player: Player) -> bool {
    LINES
        .iter()
        .any(|line| line.iter().all(|&i| cells[i] == Some(player)))
}

impl GameState {
    /// True iff the game is running and it is `player`'s move
    pub fn is_turn_of(&self, player: Player) -> bool {
        self.status == GameStatus::InProgress && self.turn == player
    }

    /// Indices of all empty cells
    pub fn empty_cells(&self) -> Vec<usize> {
        (0..BOARD_SIZE).filter(|&i| self.cells[i].is_none()).collect()
    }

    /// Moves `player` could legally make right now
    pub fn valid_moves(&self, player: Player) -> Vec<usize> {
        if !self.is_turn_of(player) {
            return Vec::new();
        }
        self.empty_cells()
    }

    /// Check a move without applying it
    pub fn check_move(&self, player: Player, index: usize) -> Result<(), GameError> {
        if self.status.is_over() {
            return Err(GameError::GameAlreadyOver);
        }
        if !self.is_turn_of(player) {
            return Err(GameError::NotYourTurn);
        }
        if index >= BOARD_SIZE {
            return Err(GameError::IndexOutOfRange(index));
        }
        if self.cells[index].is_some() {
            return Err(GameError::CellOccupied(index));
        }
        Ok(())
    }

    /// Place `player`'s mark at `index`.
    ///
    /// The state is only touched once every check has passed, so a rejected
    /// move leaves cells, turn and status exactly as they were. A move that
    /// completes a line and fills the board at once counts as a win.
    pub fn apply_move(&mut self, player: Player, index: usize) -> Result<MoveOutcome, GameError> {
        self.check_move(player, index)?;

        self.cells[index] = Some(player);

        if completes_line(&self.cells, player) {
            self.status = GameStatus::won_by(player);
            return Ok(MoveOutcome::Won(player));
        }
        if is_board_full(&self.cells) {
            self.status = GameStatus::Draw;
            return Ok(MoveOutcome::Draw);
        }

        self.turn = player.opponent();
        Ok(MoveOutcome::Continue)
    }

    /// Copying form of [`GameState::apply_move`]
    pub fn with_move(&self, player: Player, index: usize) -> Result<(GameState, MoveOutcome), GameError> {
        let mut next = self.clone();
        let outcome = next.apply_move(player, index)?;
        Ok((next, outcome))
    }
}
