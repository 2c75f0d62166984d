use std::io;

use thiserror::Error;

/// Everything that can go wrong between a request and the arena.
#[derive(Debug, Error)]
pub enum AllocError {
  #[error("invalid size: requests must be larger than 0 bytes")]
  InvalidSize,

  #[error("out of memory: requested {requested} bytes, {remaining} bytes left in the arena")]
  OutOfMemory { requested: usize, remaining: usize },

  #[error("corrupted header at arena offset {offset:#x}: magic {found:#010x}")]
  CorruptedHeader { offset: usize, found: u32 },

  #[error("double free of block at arena offset {offset:#x}")]
  DoubleFree { offset: usize },

  #[error("pointer {addr:#x} was not handed out by this heap")]
  InvalidPointer { addr: usize },

  #[error("could not reserve a {capacity} byte arena")]
  ArenaUnavailable {
    capacity: usize,
    #[source]
    source: io::Error,
  },

  #[error("invalid heap configuration: {reason}")]
  InvalidConfig { reason: String },
}

impl AllocError {
  /// Whether the error means the heap can no longer be trusted.
  ///
  /// Zero-size requests and exhaustion are ordinary outcomes; everything
  /// touching a released or foreign block is not.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      AllocError::CorruptedHeader { .. }
        | AllocError::DoubleFree { .. }
        | AllocError::InvalidPointer { .. }
    )
  }
}

pub type Result<T> = std::result::Result<T, AllocError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fatal_classification() {
    assert!(!AllocError::InvalidSize.is_fatal());
    assert!(
      !AllocError::OutOfMemory {
        requested: 64,
        remaining: 0
      }
      .is_fatal()
    );
    assert!(
      AllocError::CorruptedHeader {
        offset: 0x10,
        found: 0
      }
      .is_fatal()
    );
    assert!(AllocError::DoubleFree { offset: 0x10 }.is_fatal());
    assert!(AllocError::InvalidPointer { addr: 0x10 }.is_fatal());
  }

  #[test]
  fn test_display_mentions_magic() {
    let err = AllocError::CorruptedHeader {
      offset: 0x20,
      found: 0x1234,
    };
    assert_eq!(
      err.to_string(),
      "corrupted header at arena offset 0x20: magic 0x00001234"
    );
  }
}
