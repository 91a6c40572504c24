//! Terminal participant: joins a game through the hub and plays or watches it.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ttt_core::Player;
use ttt_sync::{
    BotSource, ChangeNotifier, GameService, HubClient, MoveSource, ParticipantLoop, StateStore, SyncError,
};

mod cli;
mod input;
mod render;

use cli::{Cli, Mode};
use input::StdinSource;
use render::TerminalRenderer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Quiet by default so log lines don't interleave with the prompt
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mode = cli
        .mode()
        .context("--player is required unless --reset or --watch is given")?;

    let hub = Arc::new(
        HubClient::connect(&cli.server)
            .await
            .with_context(|| format!("could not connect to hub at {}", cli.server))?,
    );

    let result = match mode {
        Mode::Reset => reset(&hub, &cli.game_id).await,
        Mode::Watch => ttt_sync::watch(
            &cli.game_id,
            Arc::clone(&hub),
            Arc::clone(&hub),
            TerminalRenderer::new(None, true),
        )
        .await
        .context("watching game"),
        Mode::Play(player) => play(&hub, &cli, player).await,
    };

    if let Err(e) = hub.close().await {
        warn!("{}", e);
    }
    result
}

async fn reset(hub: &Arc<HubClient>, game_id: &str) -> anyhow::Result<()> {
    hub.reset(game_id).await.context("resetting game")?;
    hub.publish(game_id).await.context("announcing reset")?;
    info!(%game_id, "Game reset");
    println!("Game {game_id} reset.");
    Ok(())
}

async fn play(hub: &Arc<HubClient>, cli: &Cli, player: Player) -> anyhow::Result<()> {
    let service = GameService::new(Arc::clone(hub));
    match service.get_state(&cli.game_id).await {
        Ok(_) => {}
        Err(SyncError::NotFound(_)) => {
            info!(game_id = %cli.game_id, "No such game yet, creating it");
            service.reset(&cli.game_id).await.context("creating game")?;
            hub.publish(&cli.game_id).await.context("announcing new game")?;
        }
        Err(e) => return Err(e).context("loading game"),
    }

    match cli.bot {
        Some(difficulty) => run_loop(hub, cli, player, BotSource::new(player, difficulty)).await,
        None => run_loop(hub, cli, player, StdinSource::stdin()).await,
    }
}

async fn run_loop<M: MoveSource>(hub: &Arc<HubClient>, cli: &Cli, player: Player, input: M) -> anyhow::Result<()> {
    let clear = cli.bot.is_none();
    ParticipantLoop::new(
        cli.game_id.clone(),
        player,
        Arc::clone(hub),
        Arc::clone(hub),
        input,
        TerminalRenderer::new(Some(player), clear),
    )
    .run()
    .await
    .context("game loop stopped")
}
