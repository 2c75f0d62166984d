use tracing::{debug, trace, warn};

use crate::{
  align,
  arena::HeapArena,
  block::{self, BlockIndex, FreeBlock, MIN_BLOCK_SIZE, TAG_SIZE},
  config::HeapConfig,
  error::{AllocError, Result},
};

/// Point-in-time view of a heap, in bytes and blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Size of the arena mapping.
  pub capacity: usize,
  /// Bytes below the arena cursor, free or live.
  pub reserved: usize,
  /// Bytes sitting in the free list.
  pub free_bytes: usize,
  /// Number of free list entries.
  pub free_blocks: usize,
  /// Blocks currently handed out.
  pub live_blocks: usize,
  /// Bytes in blocks currently handed out, tags included.
  pub live_bytes: usize,
}

/// First-fit allocator over an address-ordered free list.
///
/// ```text
///   arena:  ┌──────┬────────┬──────┬──────────┬──────┬────────────────┐
///           │ live │ free A │ live │  free B  │ live │   (unused)     │
///           └──────┴────────┴──────┴──────────┴──────┴────────────────┘
///   list:   head ──► A ──► B ──► None                  ▲ cursor
/// ```
///
/// Every block starts with an 8-byte tag holding its full size; the payload
/// follows. Free blocks are recorded out of band in `nodes`, linked by index,
/// with vacated record slots kept in `vacant` for reuse.
pub struct FreeListAllocator {
  arena: HeapArena,
  nodes: Vec<FreeBlock>,
  vacant: Vec<BlockIndex>,
  head: Option<BlockIndex>,
  min_split: usize,
  live_blocks: usize,
  live_bytes: usize,
}

impl FreeListAllocator {
  pub fn new(config: &HeapConfig) -> Result<Self> {
    config.validate()?;

    Ok(Self::with_arena(HeapArena::new(config.arena_capacity)?, config.min_split))
  }

  /// Builds the allocator around an arena whose space is still untouched.
  pub fn with_arena(
    arena: HeapArena,
    min_split: usize,
  ) -> Self {
    Self {
      arena,
      nodes: Vec::new(),
      vacant: Vec::new(),
      head: None,
      min_split: min_split.max(MIN_BLOCK_SIZE),
      live_blocks: 0,
      live_bytes: 0,
    }
  }

  pub fn arena(&self) -> &HeapArena {
    &self.arena
  }

  pub fn arena_mut(&mut self) -> &mut HeapArena {
    &mut self.arena
  }

  /// Block size needed to serve a `size` byte request.
  pub fn block_size_for(size: usize) -> Option<usize> {
    align::checked_align(size)?.checked_add(TAG_SIZE)
  }

  /// Hands out a block with room for `size` bytes and returns its payload offset.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<usize> {
    if size == 0 {
      return Err(AllocError::InvalidSize);
    }

    let needed = Self::block_size_for(size).ok_or(AllocError::OutOfMemory {
      requested: size,
      remaining: self.arena.remaining(),
    })?;

    let (offset, block_size) = match self.take_first_fit(needed) {
      Some(found) => found,
      None => self.take_from_top(needed).inspect_err(|_| {
        warn!(
          requested = size,
          remaining = self.arena.remaining(),
          free_bytes = self.free_bytes(),
          "heap exhausted"
        );
      })?,
    };

    self.write_tag(offset, block_size)?;
    self.live_blocks += 1;
    self.live_bytes += block_size;

    let payload = block::payload_of(offset);
    trace!(size, block_size, payload, "allocated block");

    Ok(payload)
  }

  /// Returns the block whose payload starts at `payload` to the free list.
  pub fn free(
    &mut self,
    payload: usize,
  ) -> Result<()> {
    let (offset, size) = self.live_block_at(payload)?;

    // Last free block below `offset`, and the one after it.
    let mut prev: Option<BlockIndex> = None;
    let mut next = self.head;
    while let Some(index) = next {
      let node = self.node(index);
      if node.offset > offset {
        break;
      }
      prev = Some(index);
      next = node.next;
    }

    let end = offset + size;
    let overlaps_prev = prev.is_some_and(|p| self.node(p).end() > offset);
    let overlaps_next = next.is_some_and(|n| self.node(n).offset < end);
    if overlaps_prev || overlaps_next {
      tracing::error!(offset, size, "block released twice");
      return Err(AllocError::DoubleFree { offset });
    }

    let merge_prev = prev.filter(|&p| self.node(p).end() == offset);
    let merge_next = next.filter(|&n| self.node(n).offset == end);

    match (merge_prev, merge_next) {
      (Some(p), Some(n)) => {
        let absorbed = *self.node(n);
        let left = self.node_mut(p);
        left.size += size + absorbed.size;
        left.next = absorbed.next;
        self.release_node(n);
        let merged = self.node(p);
        debug!(offset = merged.offset, size = merged.size, "coalesced with both neighbours");
      }
      (Some(p), None) => {
        let merged = self.node_mut(p);
        merged.size += size;
        debug!(offset = merged.offset, size = merged.size, "coalesced with lower neighbour");
      }
      (None, Some(n)) => {
        let merged = self.node_mut(n);
        merged.offset = offset;
        merged.size += size;
        debug!(offset, size = merged.size, "coalesced with upper neighbour");
      }
      (None, None) => {
        let index = self.acquire_node(FreeBlock::new(offset, size, next));
        self.link_after(prev, index);
      }
    }

    self.live_blocks -= 1;
    self.live_bytes -= size;
    trace!(payload, size, "freed block");

    Ok(())
  }

  /// Payload bytes available in the live block at `payload`.
  pub fn usable_size(
    &self,
    payload: usize,
  ) -> Result<usize> {
    self.live_block_at(payload).map(|(_, size)| size - TAG_SIZE)
  }

  /// Free blocks as `(offset, size)` pairs in address order.
  pub fn free_ranges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut cursor = self.head;

    std::iter::from_fn(move || {
      let node = self.node(cursor?);
      cursor = node.next;
      Some((node.offset, node.size))
    })
  }

  pub fn stats(&self) -> HeapStats {
    HeapStats {
      capacity: self.arena.capacity(),
      reserved: self.arena.reserved(),
      free_bytes: self.free_bytes(),
      free_blocks: self.free_ranges().count(),
      live_blocks: self.live_blocks,
      live_bytes: self.live_bytes,
    }
  }

  fn free_bytes(&self) -> usize {
    self.free_ranges().map(|(_, size)| size).sum()
  }

  /// Unlinks or shrinks the first free block of at least `needed` bytes.
  ///
  /// The allocation takes the front of the block so a split remainder keeps
  /// its place in the address order.
  fn take_first_fit(
    &mut self,
    needed: usize,
  ) -> Option<(usize, usize)> {
    let mut prev: Option<BlockIndex> = None;
    let mut cursor = self.head;

    while let Some(index) = cursor {
      let node = *self.node(index);

      if node.size >= needed {
        if node.size - needed >= self.min_split {
          let rest = self.node_mut(index);
          rest.offset += needed;
          rest.size -= needed;
          debug!(
            offset = node.offset,
            taken = needed,
            remainder = rest.size,
            "split free block"
          );
          return Some((node.offset, needed));
        }

        match prev {
          Some(p) => self.node_mut(p).next = node.next,
          None => self.head = node.next,
        }
        self.release_node(index);
        return Some((node.offset, node.size));
      }

      prev = cursor;
      cursor = node.next;
    }

    None
  }

  /// Serves `needed` bytes from the arena cursor.
  ///
  /// A free block that ends at the cursor is grown in place, so only the
  /// missing part is reserved. The free list is left alone if the arena
  /// cannot supply it.
  fn take_from_top(
    &mut self,
    needed: usize,
  ) -> Result<(usize, usize)> {
    let mut prev: Option<BlockIndex> = None;
    let mut last = self.head;
    while let Some(index) = last {
      let Some(next) = self.node(index).next else {
        break;
      };
      prev = last;
      last = Some(next);
    }

    let top = last.filter(|&index| self.node(index).end() == self.arena.reserved());
    let Some(index) = top else {
      return Ok((self.arena.reserve(needed)?, needed));
    };

    // First fit already turned this block down, so it is smaller than `needed`.
    let block = *self.node(index);
    self.arena.reserve(needed - block.size)?;

    match prev {
      Some(p) => self.node_mut(p).next = None,
      None => self.head = None,
    }
    self.release_node(index);
    debug!(
      offset = block.offset,
      grown = needed - block.size,
      "extended top free block"
    );

    Ok((block.offset, needed))
  }

  /// Validates `payload` and reads the size of the block in front of it.
  fn live_block_at(
    &self,
    payload: usize,
  ) -> Result<(usize, usize)> {
    let invalid = || AllocError::InvalidPointer {
      addr: self.arena.base().as_ptr() as usize + payload,
    };

    if !align::is_aligned(payload) {
      return Err(invalid());
    }

    let offset = block::block_of(payload).ok_or_else(invalid)?;
    let size = self.arena.load_u64(offset).ok_or_else(invalid)? as usize;

    let plausible = size >= MIN_BLOCK_SIZE
      && align::is_aligned(size)
      && offset
        .checked_add(size)
        .is_some_and(|end| end <= self.arena.reserved());

    if !plausible {
      return Err(invalid());
    }

    Ok((offset, size))
  }

  fn write_tag(
    &mut self,
    offset: usize,
    size: usize,
  ) -> Result<()> {
    self
      .arena
      .store_u64(offset, size as u64)
      .ok_or(AllocError::InvalidPointer {
        addr: self.arena.base().as_ptr() as usize + offset,
      })
  }

  fn link_after(
    &mut self,
    prev: Option<BlockIndex>,
    index: BlockIndex,
  ) {
    match prev {
      Some(p) => self.node_mut(p).next = Some(index),
      None => self.head = Some(index),
    }
  }

  fn acquire_node(
    &mut self,
    block: FreeBlock,
  ) -> BlockIndex {
    match self.vacant.pop() {
      Some(index) => {
        self.nodes[index.get()] = block;
        index
      }
      None => {
        self.nodes.push(block);
        BlockIndex::new(self.nodes.len() - 1)
      }
    }
  }

  fn release_node(
    &mut self,
    index: BlockIndex,
  ) {
    self.vacant.push(index);
  }

  fn node(
    &self,
    index: BlockIndex,
  ) -> &FreeBlock {
    &self.nodes[index.get()]
  }

  fn node_mut(
    &mut self,
    index: BlockIndex,
  ) -> &mut FreeBlock {
    &mut self.nodes[index.get()]
  }
}
