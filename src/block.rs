use crate::align::ALIGNMENT;

/// Bytes of bookkeeping in front of every payload: the block size as a `u64`.
pub const TAG_SIZE: usize = 8;

/// Smallest block the heap ever creates: a tag plus one aligned word.
pub const MIN_BLOCK_SIZE: usize = TAG_SIZE + ALIGNMENT;

/// Position of a [`FreeBlock`] record in the free list's backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockIndex(usize);

impl BlockIndex {
  pub fn new(index: usize) -> Self {
    Self(index)
  }

  pub fn get(self) -> usize {
    self.0
  }
}

/// A run of unused arena bytes.
///
/// `offset` and `size` cover the whole block, tag included. `next` links to
/// the following free block in address order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock {
  pub offset: usize,
  pub size: usize,
  pub next: Option<BlockIndex>,
}

impl FreeBlock {
  pub fn new(
    offset: usize,
    size: usize,
    next: Option<BlockIndex>,
  ) -> Self {
    Self { offset, size, next }
  }

  /// One past the last byte of the block.
  pub fn end(&self) -> usize {
    self.offset + self.size
  }
}

/// Offset of the payload for a block starting at `block_offset`.
pub fn payload_of(block_offset: usize) -> usize {
  block_offset + TAG_SIZE
}

/// Offset of the block whose payload starts at `payload_offset`.
pub fn block_of(payload_offset: usize) -> Option<usize> {
  payload_offset.checked_sub(TAG_SIZE)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_block_payload_roundtrip() {
    assert_eq!(payload_of(0), 8);
    assert_eq!(block_of(8), Some(0));
    assert_eq!(block_of(4), None);
  }

  #[test]
  fn test_end() {
    let block = FreeBlock::new(32, 48, None);
    assert_eq!(block.end(), 80);
  }
}
