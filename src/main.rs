//! Bouncing logo screensaver
//!
//! Bounces a logo around an RGB LED matrix, flashing it green on corner hits
//! and blue on wall hits. Press Ctrl+C to exit.
//!
//! ## Architecture
//! - **Ticker thread**: sends a tick into a bounded queue (8 Hz by default)
//! - **Main thread**: event loop, steps the simulator and plays feedback
//! - **Render thread**: owns the LED matrix, redraws the logo every frame
//!
//! Built without the `hardware` feature, the render thread draws into an
//! in-memory frame buffer instead, which is handy for trying things out
//! with `RUST_LOG=debug`.
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/bounce-matrix --rows 64 --cols 128 --speed 2
//! ```

use bounce_matrix::app::{self, DEFAULT_TICK_HZ, RenderStyle, SharedSimulator, event_queue};
use bounce_matrix::bounce::{BounceSimulator, Bounds, DEFAULT_SPEED};
use bounce_matrix::feedback::{self, FeedbackSink, FlashSlot, PanelFlash, ToneLog};
use bounce_matrix::logo::Logo;
use bounce_matrix::{Color, PanelConfig, request_stop, setup_signal_handler};
use clap::Parser;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Bouncing logo screensaver for an RGB LED matrix
#[derive(Parser)]
#[command(name = "bounce-matrix")]
#[command(about = "Bounce a logo around an RGB LED matrix")]
#[command(version)]
struct Args {
    /// Number of rows on the LED panel
    #[arg(long, default_value = "64")]
    rows: u32,

    /// Number of columns on the LED panel
    #[arg(long, default_value = "128")]
    cols: u32,

    /// Pixels moved per tick on each axis
    #[arg(long, default_value_t = DEFAULT_SPEED, value_parser = clap::value_parser!(u16).range(1..))]
    speed: u16,

    /// Seed for the starting position and direction (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Simulation ticks per second
    #[arg(long, default_value_t = DEFAULT_TICK_HZ, value_parser = clap::value_parser!(u32).range(1..=120))]
    tick_hz: u32,

    /// Redraws per second
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..=240))]
    fps: u32,

    /// Display brightness (0-100)
    #[arg(long, default_value = "75", value_parser = clap::value_parser!(u8).range(0..=100))]
    brightness: u8,

    /// Image file to bounce instead of the built-in logo
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    run_for: Option<u64>,

    /// Print a JSON run summary on exit
    #[arg(long)]
    summary: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let panel = PanelConfig::new(args.rows, args.cols);

    let logo = match &args.logo {
        Some(path) => Logo::load(path, panel.extent())?,
        None => Logo::builtin(),
    };
    let bounds = Bounds::from_extents(panel.extent(), logo.extent())?;

    let mut rng = match args.seed {
        Some(seed) => Pcg32::seed_from_u64(seed),
        None => Pcg32::from_rng(&mut rand::rng()),
    };
    let simulator = BounceSimulator::random(bounds, args.speed, &mut rng);

    tracing::info!("Bounce Matrix v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Panel: {}x{}", panel.cols, panel.rows);
    tracing::info!(
        "Logo: {}x{}, bounds: {}x{}",
        logo.extent().width,
        logo.extent().height,
        bounds.max_x(),
        bounds.max_y()
    );
    tracing::info!(
        "Start: ({}, {}) heading ({}, {}), speed {}",
        simulator.position().x,
        simulator.position().y,
        simulator.direction().dx,
        simulator.direction().dy,
        args.speed
    );

    let running = setup_signal_handler()?;
    let flash = feedback::new_flash_slot();
    let mut sinks: Vec<Box<dyn FeedbackSink + Send>> = vec![
        Box::new(PanelFlash::new(flash.clone())),
        Box::new(ToneLog::default()),
    ];

    // The initial placement may already sit on an edge.
    if let Some(effect) = feedback::Effect::for_bounce(simulator.last_bounce()) {
        feedback::relay(&effect, &mut sinks);
    }

    let shared = app::share(simulator);
    let style = RenderStyle {
        logo_color: Color::WHITE,
        brightness: args.brightness,
        frame_interval: Duration::from_secs(1) / args.fps,
    };

    let render_handle = spawn_renderer(panel, shared.clone(), flash, logo, style, running.clone());

    let (tx, rx) = event_queue();
    let ticker = app::spawn_ticker(tx.clone(), app::tick_interval(args.tick_hz), running.clone());
    if let Some(secs) = args.run_for {
        app::spawn_stop_timer(tx.clone(), Duration::from_secs(secs));
    }
    drop(tx);

    let summary = app::event_loop(&rx, &shared, &mut sinks, &running);

    // Stop the ticker and renderer whichever way the event loop ended.
    request_stop(&running);
    if ticker.join().is_err() {
        tracing::warn!("Ticker thread panicked");
    }
    if render_handle.join().is_err() {
        tracing::warn!("Render thread panicked");
    }

    tracing::info!(
        "Done: {} ticks, {} wall bounces, {} corner bounces",
        summary.ticks,
        summary.wall_bounces,
        summary.corner_bounces
    );

    if args.summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

#[cfg(feature = "hardware")]
fn spawn_renderer(
    panel: PanelConfig,
    shared: SharedSimulator,
    flash: FlashSlot,
    logo: Logo,
    style: RenderStyle,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        bounce_matrix::render::run_led_renderer(panel, shared, flash, logo, style, &running);
    })
}

#[cfg(not(feature = "hardware"))]
fn spawn_renderer(
    panel: PanelConfig,
    shared: SharedSimulator,
    flash: FlashSlot,
    logo: Logo,
    style: RenderStyle,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    use bounce_matrix::app::FrameBuffer;

    tracing::info!("Built without the 'hardware' feature, rendering to memory");
    thread::spawn(move || {
        let mut surface = FrameBuffer::new(panel);
        app::render_loop(&mut surface, &shared, &flash, &logo, style, &running);
        tracing::info!("Rendered {} frames", surface.frames());
    })
}
