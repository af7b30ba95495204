//! Neural Breach: headless dual n-back sessions

use anyhow::Context;
use clap::{Parser, Subcommand};
use neuralbreach_engine::{
    Clock, EngineConfig, GameEvent, GameInput, GameLoop, GameMachine, Player, PlayerMove, Presented,
    RetryingAudio, SilentAudio, SkilledPlayer, StimulusGenerator, SystemClock, VirtualDriver,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "neuralbreach", about = "Neural Breach adaptive dual n-back engine")]
struct Cli {
    /// Engine config (TOML). Defaults apply when missing.
    #[arg(short, long, global = true, default_value = "neuralbreach.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a session in virtual time and print the session record
    Simulate {
        #[arg(short, long, default_value = "simulated-player")]
        user: String,
        /// Seed for both the stimulus sequence and the player
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        /// Blocks to play before quitting
        #[arg(short, long, default_value_t = 3)]
        blocks: u32,
        /// Probability (0-1) that the simulated player answers correctly
        #[arg(long, default_value_t = 0.85, value_parser = parse_skill)]
        skill: f64,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Play a session on the wall clock with silent audio
    Realtime {
        #[arg(short, long, default_value = "simulated-player")]
        user: String,
        #[arg(short, long)]
        seed: Option<u64>,
        #[arg(short, long, default_value_t = 1)]
        blocks: u32,
        #[arg(long, default_value_t = 0.85, value_parser = parse_skill)]
        skill: f64,
    },
    /// Print the default config as TOML
    Config,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "neuralbreach=info,neuralbreach_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Some(Commands::Simulate { user, seed, blocks, skill, pretty }) => {
            let config = EngineConfig::load(&cli.config);
            let machine = GameMachine::new(&config, StimulusGenerator::seeded(seed))?;
            let mut driver = VirtualDriver::new(machine, SystemClock.now());
            let mut player = SkilledPlayer::new(skill, blocks, seed);

            let session = driver.run_session(&user, &mut player)?;
            println!("{}", session.to_json(pretty)?);
        }

        Some(Commands::Realtime { user, seed, blocks, skill }) => {
            let config = EngineConfig::load(&cli.config);
            run_realtime(config, user, seed, blocks, skill).await?;
        }

        Some(Commands::Config) => {
            print!("{}", EngineConfig::default().to_toml());
        }

        Some(Commands::Version) | None => {
            println!("neuralbreach v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// `--skill` must be a probability.
fn parse_skill(s: &str) -> Result<f64, String> {
    let skill: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&skill) {
        Ok(skill)
    } else {
        Err(format!("skill must be between 0 and 1, got {s}"))
    }
}

async fn run_realtime(
    config: EngineConfig,
    user: String,
    seed: Option<u64>,
    blocks: u32,
    skill: f64,
) -> anyhow::Result<()> {
    let generator = match seed {
        Some(seed) => StimulusGenerator::seeded(seed),
        None => StimulusGenerator::from_entropy(),
    };
    let machine = GameMachine::new(&config, generator)?;
    let audio = Arc::new(RetryingAudio::new(SilentAudio, config.audio.max_retries));
    let (mut game_loop, input_tx, output_tx) = GameLoop::new(machine, audio, Arc::new(SystemClock));
    let mut events = output_tx.subscribe();
    let loop_task = tokio::spawn(async move { game_loop.run().await });

    let mut player = SkilledPlayer::new(skill, blocks, seed.unwrap_or_else(rand::random));
    input_tx
        .send(GameInput::StartSession { user_id: user })
        .await
        .context("game loop closed before start")?;

    let session = loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                warn!("dropped {} game events", n);
                continue;
            }
            Err(RecvError::Closed) => anyhow::bail!("game loop stopped before the session ended"),
        };

        match event {
            GameEvent::StimulusPresented { block, trial, level, stimulus } => {
                let presented = Presented {
                    block,
                    trial,
                    level,
                    stimulus,
                };
                match player.on_stimulus(&presented) {
                    PlayerMove::Respond { response, after } => {
                        let input_tx = input_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(after).await;
                            let _ = input_tx.send(GameInput::Respond(response)).await;
                        });
                    }
                    PlayerMove::Pass => {}
                    PlayerMove::Quit => {
                        let _ = input_tx.send(GameInput::Quit).await;
                    }
                }
            }
            GameEvent::TrialEvaluated { block, trial, stability, shards, .. } => {
                info!(
                    block,
                    trial = trial.index,
                    correct = trial.result.trial_correct,
                    stability,
                    shards,
                    "trial"
                );
            }
            GameEvent::BlockEnded { block, next_level } => {
                let next = if player.continue_after(&block, next_level) {
                    GameInput::Continue
                } else {
                    GameInput::Quit
                };
                let _ = input_tx.send(next).await;
            }
            GameEvent::SessionEnded { session } => break session,
            GameEvent::Error { message } => anyhow::bail!("game error: {message}"),
            _ => {}
        }
    };

    let _ = input_tx.send(GameInput::Shutdown).await;
    loop_task.await.context("game loop panicked")?;
    println!("{}", session.to_json(true)?);
    Ok(())
}
