use std::{io, ptr::NonNull, slice};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};
use tracing::debug;

use crate::{
  align,
  align_to,
  error::{AllocError, Result},
};

/// One fixed reservation of anonymous memory that every block is carved from.
///
/// ```text
///   base                       cursor                         base + capacity
///   ├──────────────────────────┼──────────────────────────────┤
///   │   reserved (blocks)      │   never used                 │
///   └──────────────────────────┴──────────────────────────────┘
/// ```
///
/// Space below the cursor belongs to the free list or to live blocks; space
/// above it has never been handed out. The cursor only moves up.
///
/// All access to the bytes goes through offsets checked against the capacity.
pub struct HeapArena {
  base: NonNull<u8>,
  capacity: usize,
  cursor: usize,
}

// SAFETY: the arena exclusively owns its mapping and hands out no references
// into it, so moving it to another thread moves sole ownership with it.
unsafe impl Send for HeapArena {}

impl HeapArena {
  /// Maps `capacity` bytes (rounded up to whole pages) of private anonymous memory.
  pub fn new(capacity: usize) -> Result<Self> {
    if capacity == 0 {
      return Err(AllocError::InvalidConfig {
        reason: "arena capacity must be larger than 0".into(),
      });
    }

    let page = page_size();
    if capacity > usize::MAX - page {
      return Err(AllocError::ArenaUnavailable {
        capacity,
        source: io::Error::from(io::ErrorKind::InvalidInput),
      });
    }
    let capacity = align_to!(capacity, page);

    let address = unsafe {
      mmap(
        std::ptr::null_mut(),
        capacity,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(AllocError::ArenaUnavailable {
        capacity,
        source: io::Error::last_os_error(),
      });
    }

    let base = NonNull::new(address as *mut u8).ok_or_else(|| AllocError::ArenaUnavailable {
      capacity,
      source: io::Error::from(io::ErrorKind::AddrNotAvailable),
    })?;

    debug!(base = ?base, capacity, "mapped heap arena");

    Ok(Self {
      base,
      capacity,
      cursor: 0,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes below the cursor.
  pub fn reserved(&self) -> usize {
    self.cursor
  }

  pub fn remaining(&self) -> usize {
    self.capacity - self.cursor
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  /// Bumps the cursor by `size` bytes and returns the offset of the reserved run.
  ///
  /// `size` must already be a multiple of [`ALIGNMENT`](crate::align::ALIGNMENT); the returned offset
  /// then is too, and so is the matching address since the base is page aligned.
  pub fn reserve(
    &mut self,
    size: usize,
  ) -> Result<usize> {
    debug_assert!(align::is_aligned(size));

    if size > self.remaining() {
      return Err(AllocError::OutOfMemory {
        requested: size,
        remaining: self.remaining(),
      });
    }

    let offset = self.cursor;
    self.cursor += size;

    debug!(offset, size, reserved = self.cursor, "bumped arena cursor");

    Ok(offset)
  }

  pub fn contains(
    &self,
    ptr: *const u8,
  ) -> bool {
    self.offset_of(ptr).is_some()
  }

  /// Offset of `ptr` from the base, or `None` when it lies outside the arena.
  pub fn offset_of(
    &self,
    ptr: *const u8,
  ) -> Option<usize> {
    let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
    (offset < self.capacity).then_some(offset)
  }

  /// Address of `offset`. Panics if the offset lies outside the arena.
  pub fn ptr_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    assert!(offset < self.capacity, "offset {offset:#x} outside the arena");
    // SAFETY: offset is inside the mapping, so the sum neither wraps nor is null.
    unsafe { self.base.add(offset) }
  }

  /// Copies the `N` bytes starting at `offset` out of the arena.
  pub fn load<const N: usize>(
    &self,
    offset: usize,
  ) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    self.bytes().get(offset..end)?.try_into().ok()
  }

  /// Copies `data` into the arena at `offset`. `None` when it would not fit.
  pub fn store(
    &mut self,
    offset: usize,
    data: &[u8],
  ) -> Option<()> {
    let end = offset.checked_add(data.len())?;
    self.bytes_mut().get_mut(offset..end)?.copy_from_slice(data);
    Some(())
  }

  pub fn load_u64(
    &self,
    offset: usize,
  ) -> Option<u64> {
    self.load(offset).map(u64::from_ne_bytes)
  }

  pub fn store_u64(
    &mut self,
    offset: usize,
    value: u64,
  ) -> Option<()> {
    self.store(offset, &value.to_ne_bytes())
  }

  fn bytes(&self) -> &[u8] {
    // SAFETY: the mapping is `capacity` readable bytes, zero-filled by the
    // kernel, and lives as long as `self`.
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.capacity) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    // SAFETY: as in `bytes`; `&mut self` rules out other views from the arena.
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.capacity) }
  }
}

impl Drop for HeapArena {
  fn drop(&mut self) {
    let result = unsafe { munmap(self.base.as_ptr() as *mut c_void, self.capacity) };

    if result != 0 {
      tracing::error!(
        base = ?self.base,
        capacity = self.capacity,
        error = %io::Error::last_os_error(),
        "failed to unmap heap arena"
      );
    }
  }
}

fn page_size() -> usize {
  let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

  if page > 0 { page as usize } else { 4096 }
}

impl std::fmt::Debug for HeapArena {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("HeapArena")
      .field("base", &self.base)
      .field("capacity", &self.capacity)
      .field("cursor", &self.cursor)
      .finish()
  }
}
