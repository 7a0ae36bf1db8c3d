//! lasershot CLI: offline tools around the scoring pipeline.

use clap::{Args, Parser, Subcommand};
use lasershot::frames::{load_gray, load_rgb, ImageSequence};
use lasershot::session::queue::FileMessageStore;
use lasershot::vision::{LaserDetector, Target};
use lasershot::{LaserShotConfig, LaserShotError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliResult<T> = Result<T, LaserShotError>;

#[derive(Parser)]
#[command(name = "lasershot")]
#[command(about = "Ring-target scoring and laser flash detection tools")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the ring model from a target photo and print it as JSON.
    Target(TargetArgs),

    /// Score one point against the rings of a target photo.
    Score(ScoreArgs),

    /// Run the laser detector on a rectified frame (or a directory of them).
    Laser(LaserArgs),

    /// List undelivered outbound messages of a queue store.
    Pending {
        /// Path to the outbound store file.
        #[arg(long)]
        store: PathBuf,
    },

    /// Print the default configuration as JSON.
    Config {
        /// Write to this path instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct TargetArgs {
    /// Path to the target photo.
    #[arg(long)]
    image: PathBuf,

    /// Path to write the ring model (JSON).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Pipeline configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct ScoreArgs {
    /// Path to the target photo.
    #[arg(long)]
    image: PathBuf,

    #[arg(long, allow_negative_numbers = true)]
    x: f64,

    #[arg(long, allow_negative_numbers = true)]
    y: f64,

    /// Shot radius in pixels.
    #[arg(long, default_value = "3.0")]
    radius: f64,

    /// Pipeline configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct LaserArgs {
    /// Rectified frame, or a directory of frames processed in name order.
    #[arg(long)]
    image: PathBuf,

    /// Pipeline configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> CliResult<()> {
    match command {
        Commands::Target(args) => run_target(&args),
        Commands::Score(args) => run_score(&args),
        Commands::Laser(args) => run_laser(&args),
        Commands::Pending { store } => run_pending(&store),
        Commands::Config { out } => run_config(out.as_deref()),
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: bool) {
    let default = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    let _ = lasershot::core::init_from_env(default);
}

#[cfg(feature = "tracing")]
fn init_logging(verbose: bool) {
    lasershot::core::init_tracing(if verbose { "debug" } else { "warn" }, false);
}

fn load_config(path: Option<&Path>) -> CliResult<LaserShotConfig> {
    match path {
        Some(p) => Ok(LaserShotConfig::load_json(p)?),
        None => Ok(LaserShotConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── target ────────────────────────────────────────────────────────────

fn build_target(image: &Path, config: Option<&Path>) -> CliResult<Target> {
    let cfg = load_config(config)?;
    let photo = load_gray(image)?;
    Ok(Target::from_photo(&photo.view(), &cfg.target)?)
}

fn run_target(args: &TargetArgs) -> CliResult<()> {
    let target = build_target(&args.image, args.config.as_deref())?;
    match &args.out {
        Some(out) => {
            std::fs::write(out, serde_json::to_string_pretty(&target)?)?;
            println!("wrote {} rings to {}", target.len(), out.display());
            Ok(())
        }
        None => print_json(&target),
    }
}

// ── score ─────────────────────────────────────────────────────────────

fn run_score(args: &ScoreArgs) -> CliResult<()> {
    let target = build_target(&args.image, args.config.as_deref())?;
    print_json(&target.classify_point(args.x, args.y, args.radius))
}

// ── laser ─────────────────────────────────────────────────────────────

fn run_laser(args: &LaserArgs) -> CliResult<()> {
    let cfg = load_config(args.config.as_deref())?;
    let detector = LaserDetector::new(cfg.laser);

    if args.image.is_dir() {
        let frames = ImageSequence::from_dir(&args.image, 30.0)?;
        let detections: Vec<_> = frames
            .map(|frame| detector.detect(&frame.view(), frame.index))
            .collect();
        return print_json(&detections);
    }

    let frame = load_rgb(&args.image)?;
    print_json(&detector.detect(&frame.view(), 0))
}

// ── pending ───────────────────────────────────────────────────────────

fn run_pending(store: &Path) -> CliResult<()> {
    if !store.exists() {
        return Err(LaserShotError::Missing {
            path: store.display().to_string(),
        });
    }
    print_json(&FileMessageStore::read_pending(store)?)
}

// ── config ────────────────────────────────────────────────────────────

fn run_config(out: Option<&Path>) -> CliResult<()> {
    let cfg = LaserShotConfig::default();
    match out {
        Some(path) => {
            cfg.write_json(path)?;
            println!("wrote default config to {}", path.display());
            Ok(())
        }
        None => print_json(&cfg),
    }
}
