//! A minimal `log` backend printing `[LEVEL] message` lines to stderr.

use log::{LevelFilter, Log, Metadata, Record};
use std::sync::OnceLock;

struct StderrLogger {
  level: LevelFilter,
}

impl Log for StderrLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    metadata.level() <= self.level
  }

  fn log(&self, record: &Record) {
    if !self.enabled(record.metadata()) {
      return;
    }
    eprintln!("[{}] {}", record.level(), record.args());
  }

  fn flush(&self) {}
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Level selected by `RUST_LOG`, if it names one.
fn env_level() -> Option<LevelFilter> {
  let level = std::env::var("RUST_LOG").ok()?;
  match level.to_lowercase().as_str() {
    "off" => Some(LevelFilter::Off),
    "error" => Some(LevelFilter::Error),
    "warn" => Some(LevelFilter::Warn),
    "info" => Some(LevelFilter::Info),
    "debug" => Some(LevelFilter::Debug),
    "trace" => Some(LevelFilter::Trace),
    _ => None,
  }
}

/// Level for a count of `--verbose` flags.
pub fn verbosity_level(verbose: u8) -> LevelFilter {
  match verbose {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Info,
    2 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  }
}

/// Install the logger. `RUST_LOG` wins over `verbose`. Calling this again
/// has no effect.
pub fn init(verbose: u8) -> LevelFilter {
  let level = env_level().unwrap_or_else(|| verbosity_level(verbose));
  let logger = LOGGER.get_or_init(|| StderrLogger { level });
  if log::set_logger(logger).is_ok() {
    log::set_max_level(logger.level);
  }
  logger.level
}
