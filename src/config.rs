//! Heap configuration.

use std::env;

use tracing::warn;

use crate::{
  align,
  block::MIN_BLOCK_SIZE,
  error::{AllocError, Result},
};

/// Sizing knobs for a heap.
///
/// Validated when the heap is built; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  /// Bytes reserved from the OS for the arena. Rounded up to the page size.
  ///
  /// Default: 64 MiB.
  pub arena_capacity: usize,

  /// Smallest leftover that is split off into its own free block. A chosen
  /// block whose surplus is below this is handed out whole.
  ///
  /// Default: [`MIN_BLOCK_SIZE`]. Must be a multiple of 8 and at least
  /// [`MIN_BLOCK_SIZE`].
  pub min_split: usize,
}

impl HeapConfig {
  pub const DEFAULT_ARENA_CAPACITY: usize = 64 * 1024 * 1024;

  pub const DEFAULT_MIN_SPLIT: usize = MIN_BLOCK_SIZE;

  /// Env var overriding [`HeapConfig::arena_capacity`].
  pub const ARENA_BYTES_VAR: &'static str = "RMALLOC_ARENA_BYTES";

  /// Env var overriding [`HeapConfig::min_split`].
  pub const MIN_SPLIT_VAR: &'static str = "RMALLOC_MIN_SPLIT";

  pub fn new(arena_capacity: usize) -> Self {
    Self {
      arena_capacity,
      min_split: Self::DEFAULT_MIN_SPLIT,
    }
  }

  pub fn with_min_split(
    mut self,
    min_split: usize,
  ) -> Self {
    self.min_split = min_split;
    self
  }

  /// Defaults, overridden by `RMALLOC_ARENA_BYTES` and `RMALLOC_MIN_SPLIT`.
  pub fn from_env() -> Self {
    let mut config = Self::default();

    if let Some(capacity) = read_var(Self::ARENA_BYTES_VAR) {
      config.arena_capacity = capacity;
    }

    if let Some(min_split) = read_var(Self::MIN_SPLIT_VAR) {
      config.min_split = min_split;
    }

    config
  }

  pub fn validate(&self) -> Result<()> {
    if self.arena_capacity == 0 {
      return Err(AllocError::InvalidConfig {
        reason: "arena capacity must be larger than 0".into(),
      });
    }

    if self.min_split < MIN_BLOCK_SIZE || align!(self.min_split) != self.min_split {
      return Err(AllocError::InvalidConfig {
        reason: format!(
          "min_split must be a multiple of 8 and at least {MIN_BLOCK_SIZE}, got {}",
          self.min_split
        ),
      });
    }

    Ok(())
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::new(Self::DEFAULT_ARENA_CAPACITY)
  }
}

fn read_var(name: &str) -> Option<usize> {
  let raw = env::var(name).ok()?;

  match raw.trim().parse() {
    Ok(value) => Some(value),
    Err(_) => {
      warn!(var = name, value = %raw, "ignoring unparseable heap setting");
      None
    }
  }
}
