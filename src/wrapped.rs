use std::ptr::{self, NonNull};

use tracing::{error, trace};

use crate::{
  arena::HeapArena,
  config::HeapConfig,
  error::{AllocError, Result},
  free_list::HeapStats,
  simple::SimpleAllocator,
};

/// Sentinel stored in every live header.
pub const MAGIC: u32 = 0xDEADBEEF;

/// Bytes taken from the underlying block in front of the user pointer.
///
/// ```text
///   block base (8-aligned)
///   │
///   ▼
///   ┌─────┬──────────────┬───────────┬───────────────────────────┐
///   │ pad │  size: u64   │ magic: u32│  user bytes ...           │
///   └─────┴──────────────┴───────────┴───────────────────────────┘
///    4 B    8 B            4 B       ▲ user pointer (8-aligned)
///         ◄────── Header (12 B) ────►
/// ```
///
/// The header is packed against the user pointer, so magic sits at `-4` and
/// size at `-12`; the padding keeps the user pointer on an 8-byte boundary.
pub const WRAPPED_OVERHEAD: usize = 16;

/// Size and magic written in front of every wrapped allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
  pub size: u64,
  pub magic: u32,
}

impl Header {
  /// Packed size: no padding between or after the fields.
  pub const SIZE: usize = 12;

  pub fn new(size: u64) -> Self {
    Self { size, magic: MAGIC }
  }

  pub fn is_valid(&self) -> bool {
    self.magic == MAGIC
  }

  pub fn to_bytes(self) -> [u8; Self::SIZE] {
    let mut bytes = [0u8; Self::SIZE];
    bytes[..8].copy_from_slice(&self.size.to_ne_bytes());
    bytes[8..].copy_from_slice(&self.magic.to_ne_bytes());
    bytes
  }

  pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
    let mut size = [0u8; 8];
    let mut magic = [0u8; 4];
    size.copy_from_slice(&bytes[..8]);
    magic.copy_from_slice(&bytes[8..]);

    Self {
      size: u64::from_ne_bytes(size),
      magic: u32::from_ne_bytes(magic),
    }
  }
}

/// Allocations carrying a verifiable [`Header`], checked again on release.
///
/// A header moves from valid (magic set) to invalidated (zeroed) when its
/// block is released. At release time a fully zeroed header means the block
/// was already released. A zero magic under a nonzero size means `ptr` never
/// carried a header. Any other magic means the header was overwritten.
pub struct WrappedAllocator {
  inner: SimpleAllocator,
}

impl WrappedAllocator {
  pub fn new(config: &HeapConfig) -> Result<Self> {
    Ok(Self {
      inner: SimpleAllocator::new(config)?,
    })
  }

  pub fn from_simple(inner: SimpleAllocator) -> Self {
    Self { inner }
  }

  /// Null for a zero-size request or an exhausted heap.
  pub fn malloc(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    match self.try_malloc(size) {
      Ok(ptr) => ptr.as_ptr(),
      Err(_) => ptr::null_mut(),
    }
  }

  pub fn try_malloc(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    if size == 0 {
      return Err(AllocError::InvalidSize);
    }

    let total = size
      .checked_add(WRAPPED_OVERHEAD)
      .ok_or(AllocError::OutOfMemory {
        requested: size,
        remaining: self.arena().remaining(),
      })?;

    let base = self.inner.try_malloc(total)?;
    let base = self.inner.offset_of(base.as_ptr())?;
    let user = base + WRAPPED_OVERHEAD;

    self.store_header(user, Header::new(size as u64))?;
    trace!(size, user, "wrapped allocation");

    Ok(self.arena().ptr_at(user))
  }

  /// Verifies and invalidates the header at `ptr`, then releases the block.
  ///
  /// A failed check leaves the heap untouched and must be treated as fatal.
  pub fn free(
    &mut self,
    ptr: *mut u8,
  ) -> Result<()> {
    if ptr.is_null() {
      return Ok(());
    }

    let user = self.inner.offset_of(ptr)?;
    let header = self.check_header(user)?;

    let base = self.arena().ptr_at(user - WRAPPED_OVERHEAD).as_ptr();
    self.inner.usable_size(base)?;

    self.store_header(user, Header { size: 0, magic: 0 })?;
    if let Err(err) = self.inner.free(base) {
      self.store_header(user, header)?;
      return Err(err);
    }

    Ok(())
  }

  /// Reads and checks the header at `ptr` without releasing anything.
  pub fn verify(
    &self,
    ptr: *const u8,
  ) -> Result<Header> {
    let user = self.inner.offset_of(ptr)?;
    self.check_header(user)
  }

  /// The size originally requested for `ptr`.
  pub fn usable_size(
    &self,
    ptr: *const u8,
  ) -> Result<usize> {
    self.verify(ptr).map(|header| header.size as usize)
  }

  pub fn stats(&self) -> HeapStats {
    self.inner.stats()
  }

  /// The raw facade sharing this heap.
  pub fn simple(&self) -> &SimpleAllocator {
    &self.inner
  }

  pub fn simple_mut(&mut self) -> &mut SimpleAllocator {
    &mut self.inner
  }

  pub fn arena(&self) -> &HeapArena {
    self.inner.arena()
  }

  fn check_header(
    &self,
    user: usize,
  ) -> Result<Header> {
    let offset = user
      .checked_sub(WRAPPED_OVERHEAD)
      .map(|base| base + (WRAPPED_OVERHEAD - Header::SIZE))
      .ok_or(AllocError::InvalidPointer {
        addr: self.arena().base().as_ptr() as usize + user,
      })?;

    let header = self
      .arena()
      .load::<{ Header::SIZE }>(offset)
      .map(Header::from_bytes)
      .ok_or(AllocError::InvalidPointer {
        addr: self.arena().base().as_ptr() as usize + user,
      })?;

    if header.is_valid() {
      return Ok(header);
    }

    match header {
      Header { size: 0, magic: 0 } => {
        error!(offset, "wrapped block released twice");
        Err(AllocError::DoubleFree { offset })
      }
      Header { size, magic: 0 } => {
        error!(offset, size, "no wrapped header in front of pointer");
        Err(AllocError::InvalidPointer {
          addr: self.arena().base().as_ptr() as usize + user,
        })
      }
      Header { magic: found, .. } => {
        error!(offset, found, "wrapped header corrupted");
        Err(AllocError::CorruptedHeader { offset, found })
      }
    }
  }

  fn store_header(
    &mut self,
    user: usize,
    header: Header,
  ) -> Result<()> {
    let offset = user - Header::SIZE;

    self
      .inner
      .arena_mut()
      .store(offset, &header.to_bytes())
      .ok_or(AllocError::InvalidPointer { addr: user })
  }
}
