//! Vi Loop Player (vi-loop) - Main entry point
//!
//! Runs the loop service against the simulated queue player so the whole
//! validation → install → loop lifecycle can be watched from a terminal.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vi_common::config::{LoggingConfig, TomlConfig};
use vi_common::events::{EventBus, LoopNotice, LoopState};
use vi_loop::asset::{AssetProperties, KeyStatus, LoadError, LoadReport};
use vi_loop::reporter::LogReporter;
use vi_loop::sim::{SimulatedLoader, SimulatedQueuePlayer};
use vi_loop::validator::AssetValidator;
use vi_loop::{Asset, LoopController, LoopService, MetadataKey};

/// Simulated engine clock resolution
const CLOCK_TICK_MS: u64 = 50;

/// Command-line arguments for vi-loop
#[derive(Parser, Debug)]
#[command(name = "vi-loop")]
#[command(about = "Loop a single video asset on a simulated queue player")]
#[command(version)]
struct Args {
    /// Config file (overrides VI_CONFIG and the per-user config file)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Media source name shown in logs
    #[arg(short, long, default_value = "demo.mov")]
    source: String,

    /// Simulated media duration in seconds
    #[arg(short, long, default_value_t = 3.0)]
    duration: f64,

    /// Exit after this many loop continuations (0 runs until Ctrl+C)
    #[arg(short, long, default_value_t = 3)]
    loops: u64,

    /// Make one metadata key fail to load (duration, playable, hasProtectedContent)
    #[arg(long)]
    fail_key: Option<MetadataKey>,

    /// Report the asset as not playable
    #[arg(long)]
    unplayable: bool,

    /// Report the asset as carrying protected content
    #[arg(long)]
    protected: bool,

    /// Print notices as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!("Starting vi-loop for {} ({}s)", args.source, args.duration);

    // Simulated engine
    let asset = Asset::new(args.source.clone());
    let loader = Arc::new(SimulatedLoader::new());
    loader.insert(&asset, simulated_report(&args));
    let player = SimulatedQueuePlayer::new();

    let bus = EventBus::new(config.playback.event_capacity);
    let mut notices = bus.subscribe();

    let (controller, inbox) = LoopController::new(
        player.clone(),
        AssetValidator::new(loader),
        Arc::new(LogReporter),
        bus,
    );
    let controller = controller.with_autoplay(config.playback.autoplay);
    let handle = LoopService::spawn(controller, inbox, &config.playback);

    let clock = tokio::spawn(run_clock(player));

    handle
        .set_asset(Some(asset))
        .await
        .context("Failed to assign asset")?;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut started = false;

    let outcome = loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    print_notice(&notice, args.json)?;
                    match notice {
                        LoopNotice::StateChanged { new_state: LoopState::Ready, .. } if !started => {
                            started = true;
                            handle.play().await.context("Failed to start playback")?;
                        }
                        LoopNotice::StateChanged { new_state: LoopState::Playing, .. } => {
                            started = true;
                        }
                        LoopNotice::LoopRestarted { iteration, .. }
                            if args.loops > 0 && iteration >= args.loops =>
                        {
                            info!("Completed {} loops", iteration);
                            break Ok(());
                        }
                        LoopNotice::AssetRejected { message, .. } => break Err(anyhow!(message)),
                        LoopNotice::PlaybackHalted { reason, .. } => {
                            break Err(anyhow!("Playback halted: {}", reason));
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {} notices", skipped),
                Err(RecvError::Closed) => break Ok(()),
            },
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down");
                break Ok(());
            }
        }
    };

    if let Ok(snapshot) = handle.snapshot().await {
        if args.json {
            println!("{}", serde_json::to_string(&snapshot)?);
        } else {
            println!(
                "final: {} after {} loops at {:.2}s",
                snapshot.state, snapshot.loops_completed, snapshot.position_secs
            );
        }
    }

    clock.abort();
    handle.shutdown().await.context("Loop service shutdown failed")?;
    info!("Shutdown complete");

    outcome
}

/// Load report the simulated loader hands out for the demo asset
fn simulated_report(args: &Args) -> LoadReport {
    let report = LoadReport::loaded(AssetProperties {
        duration_secs: args.duration,
        playable: !args.unplayable,
        has_protected_content: args.protected,
    });
    match args.fail_key {
        Some(key) => report.with_status(
            key,
            KeyStatus::Failed(Some(LoadError::new("simulated load failure"))),
        ),
        None => report,
    }
}

/// Drive the simulated player in real time
async fn run_clock(player: SimulatedQueuePlayer) {
    let step = Duration::from_millis(CLOCK_TICK_MS);
    let mut ticker = tokio::time::interval(step);
    loop {
        ticker.tick().await;
        player.tick(step);
    }
}

fn print_notice(notice: &LoopNotice, json: bool) -> Result<()> {
    debug!(notice = notice.event_type(), "Notice received");
    if json {
        println!("{}", serde_json::to_string(notice)?);
        return Ok(());
    }

    match notice {
        LoopNotice::StateChanged {
            old_state,
            new_state,
            ..
        } => println!("state: {} -> {}", old_state, new_state),
        LoopNotice::AssetRejected { message, .. } => println!("rejected: {}", message),
        LoopNotice::PlaybackHalted { reason, .. } => println!("halted: {}", reason),
        LoopNotice::LoopRestarted { iteration, .. } => println!("loop {} complete", iteration),
        LoopNotice::PlaybackProgress {
            position_secs,
            duration_secs,
            ..
        } => println!("position: {:.2}/{:.2}s", position_secs, duration_secs),
    }
    Ok(())
}

/// Tracing to stderr, or to the configured log file without ANSI colours
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let level = logging.level.to_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vi_loop={level},vi_common={level}")));

    let (stderr_layer, file_layer) = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(fmt::layer().with_writer(std::io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}
