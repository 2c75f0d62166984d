//! Optional `tracing` subscriber setup.
//!
//! The heap emits `tracing` events but never installs a subscriber by itself;
//! hosts that want to see them call [`init`] once.

use std::io;

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct LogConfig {
  /// Level used when `RMALLOC_LOG` is not set.
  pub level: Level,
  pub with_thread_ids: bool,
}

impl LogConfig {
  /// Env var holding an `EnvFilter` directive, e.g. `rmalloc=trace`.
  pub const FILTER_VAR: &'static str = "RMALLOC_LOG";

  /// Per-block tracing: every allocate, split, coalesce and free.
  pub fn verbose() -> Self {
    Self {
      level: Level::TRACE,
      with_thread_ids: true,
    }
  }
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: Level::WARN,
      with_thread_ids: false,
    }
  }
}

pub fn init() {
  init_with(LogConfig::default());
}

/// Installs a stderr fmt subscriber. Later calls, and calls made after some
/// other global subscriber was installed, do nothing.
pub fn init_with(config: LogConfig) {
  LOGGER_INITIALIZED.get_or_init(|| {
    let filter = EnvFilter::try_from_env(LogConfig::FILTER_VAR).unwrap_or_else(|_| {
      EnvFilter::new(format!("rmalloc={}", config.level.as_str().to_lowercase()))
    });

    let _ = tracing_subscriber::registry()
      .with(filter)
      .with(
        fmt::layer()
          .with_writer(io::stderr)
          .with_target(true)
          .with_thread_ids(config.with_thread_ids),
      )
      .try_init();
  });
}

pub fn is_initialized() -> bool {
  LOGGER_INITIALIZED.get().is_some()
}
