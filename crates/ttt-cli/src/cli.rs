//! Command-line interface for the tic-tac-toe participant.

use clap::Parser;
use ttt_core::{BotDifficulty, Player};

/// Play relayed tic-tac-toe against another participant through a hub
#[derive(Parser, Debug)]
#[command(name = "ttt")]
#[command(about = "Terminal tic-tac-toe participant", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Game to join or create
    #[arg(long)]
    pub game_id: String,

    /// Which side to play (x or o)
    #[arg(long, required_unless_present_any = ["reset", "watch"])]
    pub player: Option<Player>,

    /// Reset the game to a fresh board and exit
    #[arg(long, conflicts_with = "watch")]
    pub reset: bool,

    /// Hub URL
    #[arg(long, default_value = "ws://127.0.0.1:8709")]
    pub server: String,

    /// Only display the board, never move
    #[arg(long)]
    pub watch: bool,

    /// Let a bot pick moves instead of reading stdin (random or smart)
    #[arg(long, conflicts_with = "watch")]
    pub bot: Option<BotDifficulty>,
}

/// What the process was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Reset,
    Watch,
    Play(Player),
}

impl Cli {
    /// `None` only when no mode flag and no player were given, which clap rejects
    pub fn mode(&self) -> Option<Mode> {
        match (self.reset, self.watch, self.player) {
            (true, _, _) => Some(Mode::Reset),
            (_, true, _) => Some(Mode::Watch),
            (_, _, Some(player)) => Some(Mode::Play(player)),
            (false, false, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_play_mode() {
        let cli = Cli::try_parse_from(["ttt", "--game-id", "g1", "--player", "O"]).unwrap();
        assert_eq!(cli.mode(), Some(Mode::Play(Player::O)));
        assert_eq!(cli.server, "ws://127.0.0.1:8709");
        assert!(cli.bot.is_none());
    }

    #[test]
    fn test_reset_needs_no_player() {
        let cli = Cli::try_parse_from(["ttt", "--game-id", "g1", "--reset"]).unwrap();
        assert_eq!(cli.mode(), Some(Mode::Reset));
    }

    #[test]
    fn test_player_required_to_play() {
        assert!(Cli::try_parse_from(["ttt", "--game-id", "g1"]).is_err());
        assert!(Cli::try_parse_from(["ttt", "--game-id", "g1", "--player", "z"]).is_err());
    }

    #[test]
    fn test_no_mode_without_player() {
        let cli = Cli {
            game_id: "g1".into(),
            player: None,
            reset: false,
            server: "ws://127.0.0.1:8709".into(),
            watch: false,
            bot: None,
        };
        assert_eq!(cli.mode(), None);

        let watcher = Cli { watch: true, ..cli };
        assert_eq!(watcher.mode(), Some(Mode::Watch));
    }

    #[test]
    fn test_bot_flag() {
        let cli = Cli::try_parse_from([
            "ttt", "--game-id", "g1", "--player", "x", "--bot", "smart", "--server", "ws://hub:1",
        ])
        .unwrap();
        assert_eq!(cli.bot, Some(BotDifficulty::Smart));
        assert_eq!(cli.server, "ws://hub:1");
        assert!(Cli::try_parse_from(["ttt", "--game-id", "g1", "--watch", "--bot", "random"]).is_err());
    }
}
