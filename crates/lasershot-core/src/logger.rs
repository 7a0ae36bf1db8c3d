//! Process logger for lasershot binaries.
//!
//! Records go to stderr as `[HH:MM:SS.mmm +elapsed LEVEL target] message`,
//! with the wall clock in UTC so log lines line up with frame timestamps.
//! Records from crates outside the pipeline are capped at `Warn`.
//!
//! Library code only emits through the `log` facade and never installs a
//! logger.

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use chrono::Utc;
use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log level (or a tracing directive).
pub const LOG_ENV: &str = "LASERSHOT_LOG";

const PIPELINE_TARGET: &str = "lasershot";

struct PipelineLogger {
    level: LevelFilter,
    started: Instant,
}

impl PipelineLogger {
    fn admits(&self, metadata: &Metadata) -> bool {
        let cap = if metadata.target().starts_with(PIPELINE_TARGET) {
            self.level
        } else {
            self.level.min(LevelFilter::Warn)
        };
        metadata.level() <= cap
    }
}

impl Log for PipelineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.admits(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(
            &Utc::now().format("%H:%M:%S%.3f").to_string(),
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            &record.args().to_string(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn format_record(clock: &str, elapsed: f64, level: Level, target: &str, message: &str) -> String {
    format!("[{clock} +{elapsed:.3}s {level:>5} {target}] {message}")
}

static LOGGER: OnceLock<PipelineLogger> = OnceLock::new();

/// Install the stderr logger at `level`.
///
/// Only the first call installs; later calls return `Ok(())` untouched.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| PipelineLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install the stderr logger with the level from [`LOG_ENV`], falling back
/// to `default` when the variable is unset or unparsable.
pub fn init_from_env(default: LevelFilter) -> Result<(), log::SetLoggerError> {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| parse_level(&v))
        .unwrap_or(default);
    init_with_level(level)
}

/// Case-insensitive level name (`off`, `error`, ... `trace`).
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(value.trim()).ok()
}

/// Install a `tracing` subscriber that also receives `log` records.
///
/// The filter comes from [`LOG_ENV`] when set, otherwise `default_directive`
/// (e.g. `"info"` or `"lasershot_session=debug"`). With `json` every event is
/// one flattened JSON object per line.
#[cfg(feature = "tracing")]
pub fn init_tracing(default_directive: &str, json: bool) {
    let _ = tracing_log::LogTracer::init();
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);
    if json {
        let _ = builder.json().flatten_event(true).finish().try_init();
    } else {
        let _ = builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
