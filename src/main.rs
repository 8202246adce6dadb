//! lazy-turns - Entry Point
//!
//! Runs the virtualization engine against a simulated conversation page and
//! prints where it ended up.

use clap::Parser;
use lazy_turns::config::{self, EngineConfig};
use lazy_turns::engine::{Engine, EngineSnapshot};
use lazy_turns::host::sim::{SimPage, DEFAULT_VIEWPORT_HEIGHT};
use lazy_turns::model::{AppError, VisibilityMode};
use std::path::PathBuf;
use tracing::info;

/// Windowed virtualization for long conversation feeds, run on a simulated page
#[derive(Parser, Debug)]
#[command(name = "lazy-turns")]
#[command(version)]
#[command(about = "Simulate the lazy-turns virtualization engine on an in-memory page")]
pub struct Args {
    /// Number of turns on the page at startup
    #[arg(short, long, default_value_t = 40)]
    pub turns: usize,

    /// Words per turn
    #[arg(short, long, default_value_t = 30)]
    pub words: usize,

    /// Rendered height of each turn in pixels
    #[arg(long, default_value_t = 120.0)]
    pub height: f64,

    /// Visibility mode (hide, cost-deferred-render/cv, detach)
    #[arg(short, long)]
    pub mode: Option<VisibilityMode>,

    /// Base batch size
    #[arg(short, long)]
    pub batch: Option<usize>,

    /// Scroll to the top this many times
    #[arg(short, long, default_value_t = 0)]
    pub reveals: usize,

    /// Simulate a streamed reply after the initial fold
    #[arg(long)]
    pub stream: bool,

    /// Click the control once at the end
    #[arg(long)]
    pub toggle: bool,

    /// Put the feed inside its own scroll container instead of the window
    #[arg(long)]
    pub container: bool,

    /// Print the final state as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to log file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Fragments a streamed reply arrives in.
const STREAM_CHUNKS: [&str; 5] = [
    "Sure, ",
    "here is the first part of the answer, ",
    "followed by a longer explanation with more detail ",
    "and an example or two ",
    "before it wraps up.",
];

/// Drive an engine through the scripted session described by `args`.
fn simulate(args: &Args, engine_config: EngineConfig) -> EngineSnapshot {
    let mut page = if args.container {
        SimPage::with_scroll_container(DEFAULT_VIEWPORT_HEIGHT)
    } else {
        SimPage::new()
    };
    page.push_turns(args.turns, args.words, args.height);

    let mut engine = Engine::new(page, engine_config);
    let cfg = engine.config().clone();

    engine.boot();
    engine.advance_by(cfg.settle_poll_ms);
    engine.host_mut().set_offset(f64::MAX);

    for _ in 0..args.reveals {
        engine.host_mut().set_offset(0.0);
        engine.on_scroll();
        engine.advance_by(cfg.frame_ms);
    }

    if args.stream {
        engine.host_mut().set_stop_control(true);
        engine.advance_by(cfg.stream_poll_ms);

        let reply = engine.host_mut().push_turn("", args.height);
        for chunk in STREAM_CHUNKS {
            engine.host_mut().append_text(reply, chunk);
            engine.on_mutation();
            engine.advance_by(cfg.debounce_ms);
        }

        engine.host_mut().set_stop_control(false);
        engine.advance_by(2 * cfg.stream_poll_ms + cfg.stream_cooldown_ms);
    }

    if args.toggle {
        engine.toggle();
        engine.advance_by(cfg.frame_ms);
    }

    engine.advance_by(0);
    engine.snapshot()
}

fn print_text(snapshot: &EngineSnapshot) {
    println!("{}", snapshot.label);
    println!(
        "mode={} visible={} total={} live={} detached={} budget={} expanded={}",
        snapshot.mode,
        snapshot.visible,
        snapshot.total,
        snapshot.live,
        snapshot.detached,
        snapshot.budget,
        snapshot.expanded
    );
    println!("stream={:?} clock={}ms", snapshot.stream, snapshot.now_ms);
}

fn main() -> Result<(), AppError> {
    let args = Args::parse();

    // Defaults → Config File → Env Vars → CLI Args
    let resolved = {
        let config_file = config::load_config_with_precedence(args.config.clone())?;
        let merged = config::merge_config(config_file);
        let with_env = config::apply_env_overrides(merged);
        config::apply_cli_overrides(with_env, args.mode, args.batch, args.log_file.clone())
    };

    lazy_turns::logging::init(&resolved.log_file_path)?;

    info!(config = ?resolved, "Configuration loaded and resolved");

    let snapshot = simulate(&args, resolved.engine);
    info!(label = %snapshot.label, "simulation finished");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_text(&snapshot);
    }

    Ok(())
}
