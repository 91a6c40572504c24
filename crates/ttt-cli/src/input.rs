//! Moves typed on standard input.

use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use ttt_core::{GameState, Player};
use ttt_sync::{parse_move, MoveSource, SyncError};

/// Reads one move per line
pub struct LineSource<B> {
    lines: Lines<B>,
    prompt: bool,
}

pub type StdinSource = LineSource<BufReader<Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        LineSource::new(BufReader::new(tokio::io::stdin()), true)
    }
}

impl<B: AsyncBufRead + Unpin> LineSource<B> {
    pub fn new(reader: B, prompt: bool) -> Self {
        Self {
            lines: reader.lines(),
            prompt,
        }
    }
}

#[async_trait]
impl<B: AsyncBufRead + Unpin + Send> MoveSource for LineSource<B> {
    async fn next_move(&mut self, _state: &GameState, player: Player) -> Result<Option<usize>, SyncError> {
        if self.prompt {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "{}'s move (0-8): ", player.as_str().to_uppercase());
            let _ = out.flush();
        }

        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| SyncError::Transport(format!("reading input: {e}")))?;

        match line {
            Some(line) => parse_move(&line).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_lines_become_moves() {
        let state = GameState::new("g");
        let mut source = LineSource::new(&b"4\n  7 \nxyz\n"[..], false);

        assert_eq!(source.next_move(&state, Player::X).await, Ok(Some(4)));
        assert_eq!(source.next_move(&state, Player::X).await, Ok(Some(7)));
        assert!(matches!(
            source.next_move(&state, Player::X).await,
            Err(SyncError::MalformedInput(_))
        ));
        assert_eq!(source.next_move(&state, Player::X).await, Ok(None));
    }
}
