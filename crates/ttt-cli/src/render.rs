//! ASCII board and terminal output.

use std::io::Write;
use ttt_core::{GameState, GameStatus, Player};
use ttt_sync::{LoopEvent, Renderer};

/// Draw the 3×3 board. Empty cells show their index.
pub fn render_board(state: &GameState) -> String {
    let cells: Vec<String> = state
        .cells
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Some(Player::X) => "X".to_string(),
            Some(Player::O) => "O".to_string(),
            None => i.to_string(),
        })
        .collect();

    cells
        .chunks(3)
        .map(|row| format!(" {} | {} | {} ", row[0], row[1], row[2]))
        .collect::<Vec<_>>()
        .join("\n---+---+---\n")
}

fn status_line(status: GameStatus) -> String {
    match status.winner() {
        Some(player) => format!("Game over: {} wins!", player.as_str().to_uppercase()),
        None if status == GameStatus::Draw => "Game over: draw".to_string(),
        None => "Game in progress".to_string(),
    }
}

/// Prints loop events to stdout
pub struct TerminalRenderer {
    /// Whose screen this is, if a player's
    player: Option<Player>,
    /// Clear the screen before each board
    clear: bool,
}

impl TerminalRenderer {
    pub fn new(player: Option<Player>, clear: bool) -> Self {
        Self { player, clear }
    }
}

impl Renderer for TerminalRenderer {
    fn show(&mut self, event: LoopEvent<'_>) {
        let mut out = std::io::stdout().lock();
        let _ = match event {
            LoopEvent::State(state) => {
                if self.clear {
                    let _ = write!(out, "\x1b[2J\x1b[H");
                }
                writeln!(
                    out,
                    "Game {}\n{}\n{}",
                    state.game_id,
                    render_board(state),
                    status_line(state.status)
                )
            }
            LoopEvent::Waiting => writeln!(out, "Waiting for opponent..."),
            LoopEvent::GameOver(status) => match (status.winner(), self.player) {
                (Some(winner), Some(me)) if winner == me => writeln!(out, "You won."),
                (Some(_), Some(_)) => writeln!(out, "You lost."),
                _ => writeln!(out, "{}", status_line(status)),
            },
            LoopEvent::MoveAccepted { player, index } => {
                writeln!(out, "Move accepted: {player} -> {index}")
            }
            LoopEvent::MoveRejected(e) => writeln!(out, "{e}"),
            LoopEvent::UpdateReceived => writeln!(out, "\nUpdate received"),
        };
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_board_shows_indices() {
        let board = render_board(&GameState::new("g"));
        assert_eq!(
            board,
            " 0 | 1 | 2 \n---+---+---\n 3 | 4 | 5 \n---+---+---\n 6 | 7 | 8 "
        );
    }

    #[test]
    fn test_marks_are_uppercase() {
        let mut state = GameState::new("g");
        state.apply_move(Player::X, 4).unwrap();
        state.apply_move(Player::O, 0).unwrap();
        let board = render_board(&state);
        assert_eq!(board.lines().next(), Some(" O | 1 | 2 "));
        assert_eq!(board.lines().nth(2), Some(" 3 | X | 5 "));
    }

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(GameStatus::WonByO), "Game over: O wins!");
        assert_eq!(status_line(GameStatus::Draw), "Game over: draw");
        assert_eq!(status_line(GameStatus::InProgress), "Game in progress");
    }
}
