//! Command-line demo: plays WAV files and test tones through the simulated
//! coprocessor in real time, queueing tracks gaplessly.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use aica_player::aica::StereoMode;
use aica_player::decoders::builtin_registry;
use aica_player::{Player, PlayerConfig, PlayerStatus, SimulatedAica};

const STATUS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Routing {
    Mono,
    Stereo,
    Invert,
}

impl From<Routing> for StereoMode {
    fn from(routing: Routing) -> Self {
        match routing {
            Routing::Mono => StereoMode::Mono,
            Routing::Stereo => StereoMode::Stereo,
            Routing::Invert => StereoMode::InvertStereo,
        }
    }
}

#[derive(Parser)]
#[command(name = "aica-player")]
#[command(about = "Stream WAV files or test tones through a simulated AICA")]
struct Args {
    /// Tracks to play: `.wav` files or `tone:<hz>[:<ms>]`
    #[arg(required = true)]
    tracks: Vec<String>,

    /// Output volume (0-255)
    #[arg(short, long)]
    volume: Option<u8>,

    /// Flush between tracks instead of queueing them gaplessly
    #[arg(short, long)]
    immediate: bool,

    /// Use the low-latency preset
    #[arg(long, conflicts_with = "config")]
    low_latency: bool,

    /// Player configuration as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short = 't', long)]
    seconds: Option<f32>,

    /// Channel routing
    #[arg(long, value_enum)]
    routing: Option<Routing>,
}

fn load_config(args: &Args) -> Result<PlayerConfig> {
    let mut config = match (&args.config, args.low_latency) {
        (Some(path), _) => PlayerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        (None, true) => PlayerConfig::low_latency(),
        (None, false) => PlayerConfig::stable(),
    };
    if let Some(volume) = args.volume {
        config.volume = volume;
    }
    if let Some(routing) = args.routing {
        config.stream.stereo_mode = routing.into();
    }
    Ok(config)
}

fn print_status(player: &Player<SimulatedAica>, started: Instant) {
    let snapshot = player.session();
    let title = snapshot.info.title.as_deref().unwrap_or("-");
    let buffer_pct = snapshot.buffered as f32 * 100.0 / player.ring().size() as f32;
    println!(
        "[{:6.1}s] {:<8} {:<24} {:>7.2}s | {:>5} Hz {} | buffer {:5.1}% ({} queued) | {:?}{}",
        started.elapsed().as_secs_f32(),
        snapshot.status,
        title,
        snapshot.playtime_ms() as f32 / 1000.0,
        snapshot.format.sample_rate,
        if snapshot.format.stereo { "stereo" } else { "mono  " },
        buffer_pct,
        snapshot.queued_tracks,
        player.priority(),
        if snapshot.paused { " (paused)" } else { "" },
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(
        latency_ms = config.stream.latency_ms(),
        ring = config.ring_capacity,
        "configuration loaded"
    );

    let player = Player::init(
        SimulatedAica::realtime(),
        SimulatedAica::FIRMWARE,
        config,
        builtin_registry(),
    )
    .context("Failed to bring up the player")?;

    let deadline = args.seconds.map(|s| Duration::from_secs_f32(s.max(0.0)));
    let started = Instant::now();
    let mut queue = args.tracks.iter();
    let mut first = true;
    let mut last_report: Option<Instant> = None;

    loop {
        if deadline.is_some_and(|d| started.elapsed() >= d) {
            info!("time limit reached");
            break;
        }

        if player.status() == PlayerStatus::Ready {
            match queue.next() {
                Some(track) => {
                    if let Err(err) = player.start(track, 0, first || args.immediate) {
                        warn!(track = %track, "skipping track: {err}");
                        continue;
                    }
                    first = false;
                }
                // last track decoded; let the buffered tail play out
                None if player.session().gapless_remaining == 0 && player.ring().is_empty() => {
                    break;
                }
                None => {}
            }
        }

        if last_report.map_or(true, |at| at.elapsed() >= STATUS_INTERVAL) {
            print_status(&player, started);
            last_report = Some(Instant::now());
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    print_status(&player, started);
    player.shutdown().context("Shutdown failed")?;
    println!("Playback complete ({:.1}s)", started.elapsed().as_secs_f32());
    Ok(())
}
