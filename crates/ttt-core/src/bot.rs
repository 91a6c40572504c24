//! Automatic players.
//!
//! - Random: any empty cell
//! - Smart: win if possible, otherwise block, otherwise center, corners, edges

use crate::engine::LINES;
use crate::state::{GameState, Player};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Bot difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotDifficulty {
    Random,
    Smart,
}

/// Error returned when a string names no difficulty level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown bot difficulty {0:?} (expected \"random\" or \"smart\")")]
pub struct ParseDifficultyError(pub String);

impl FromStr for BotDifficulty {
    type Err = ParseDifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(BotDifficulty::Random),
            "smart" => Ok(BotDifficulty::Smart),
            _ => Err(ParseDifficultyError(s.to_string())),
        }
    }
}

const CORNERS: [usize; 4] = [0, 2, 6, 8];
const CENTER: usize = 4;

/// A bot that picks moves for one player
pub struct Bot {
    pub player: Player,
    pub difficulty: BotDifficulty,
    rng: StdRng,
}

impl Bot {
    pub fn new(player: Player, difficulty: BotDifficulty) -> Self {
        Self {
            player,
            difficulty,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(player: Player, difficulty: BotDifficulty, seed: u64) -> Self {
        Self {
            player,
            difficulty,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Choose a cell, or `None` if the bot cannot move
    pub fn choose_move(&mut self, game: &GameState) -> Option<usize> {
        let moves = game.valid_moves(self.player);
        if moves.is_empty() {
            return None;
        }

        match self.difficulty {
            BotDifficulty::Random => moves.choose(&mut self.rng).copied(),
            BotDifficulty::Smart => self.choose_smart(game, &moves),
        }
    }

    fn choose_smart(&mut self, game: &GameState, moves: &[usize]) -> Option<usize> {
        if let Some(win) = completing_cell(game, self.player) {
            return Some(win);
        }
        if let Some(block) = completing_cell(game, self.player.opponent()) {
            return Some(block);
        }
        if moves.contains(&CENTER) {
            return Some(CENTER);
        }

        let corners: Vec<usize> = moves
            .iter()
            .copied()
            .filter(|i| CORNERS.contains(i))
            .collect();
        corners
            .choose(&mut self.rng)
            .or_else(|| moves.choose(&mut self.rng))
            .copied()
    }
}

/// An empty cell that would give `player` a full line
fn completing_cell(game: &GameState, player: Player) -> Option<usize> {
    LINES.iter().find_map(|line| {
        let owned = line.iter().filter(|&&i| game.cells[i] == Some(player)).count();
        let empty: Vec<usize> = line
            .iter()
            .copied()
            .filter(|&i| game.cells[i].is_none())
            .collect();
        (owned == 2 && empty.len() == 1).then(|| empty[0])
    })
}
