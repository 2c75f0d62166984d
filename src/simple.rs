use std::ptr::{self, NonNull};

use crate::{
  arena::HeapArena,
  config::HeapConfig,
  error::{AllocError, Result},
  free_list::{FreeListAllocator, HeapStats},
};

/// Raw allocations: 8-byte aligned payloads with nothing in front of them
/// that the caller is meant to see.
pub struct SimpleAllocator {
  inner: FreeListAllocator,
}

impl SimpleAllocator {
  pub fn new(config: &HeapConfig) -> Result<Self> {
    Ok(Self {
      inner: FreeListAllocator::new(config)?,
    })
  }

  pub fn from_free_list(inner: FreeListAllocator) -> Self {
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
    let payload = self.inner.allocate(size)?;
    Ok(self.inner.arena().ptr_at(payload))
  }

  /// Releases `ptr`. Null is accepted and ignored.
  pub fn free(
    &mut self,
    ptr: *mut u8,
  ) -> Result<()> {
    if ptr.is_null() {
      return Ok(());
    }

    let payload = self.offset_of(ptr)?;
    self.inner.free(payload)
  }

  /// Bytes the caller may use at `ptr`; at least what was requested.
  pub fn usable_size(
    &self,
    ptr: *const u8,
  ) -> Result<usize> {
    self.inner.usable_size(self.offset_of(ptr)?)
  }

  pub fn stats(&self) -> HeapStats {
    self.inner.stats()
  }

  pub fn free_list(&self) -> &FreeListAllocator {
    &self.inner
  }

  pub fn arena(&self) -> &HeapArena {
    self.inner.arena()
  }

  pub fn arena_mut(&mut self) -> &mut HeapArena {
    self.inner.arena_mut()
  }

  pub(crate) fn offset_of(
    &self,
    ptr: *const u8,
  ) -> Result<usize> {
    self
      .arena()
      .offset_of(ptr)
      .ok_or(AllocError::InvalidPointer { addr: ptr as usize })
  }
}
