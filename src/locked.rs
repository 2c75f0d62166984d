//! Mutex-guarded heap for callers on more than one thread.
//!
//! The allocators themselves take `&mut self` and never lock. `LockedHeap`
//! serializes every operation on one heap behind a `parking_lot::Mutex`, which
//! is what the process-wide C entry points sit on.

use parking_lot::Mutex;

use crate::{
  config::HeapConfig,
  error::Result,
  free_list::HeapStats,
  wrapped::{Header, WrappedAllocator},
};

pub struct LockedHeap {
  inner: Mutex<WrappedAllocator>,
}

impl LockedHeap {
  pub fn new(config: &HeapConfig) -> Result<Self> {
    Ok(Self::from_allocator(WrappedAllocator::new(config)?))
  }

  pub fn from_allocator(allocator: WrappedAllocator) -> Self {
    Self {
      inner: Mutex::new(allocator),
    }
  }

  pub fn simple_malloc(
    &self,
    size: usize,
  ) -> *mut u8 {
    self.inner.lock().simple_mut().malloc(size)
  }

  pub fn simple_free(
    &self,
    ptr: *mut u8,
  ) -> Result<()> {
    self.inner.lock().simple_mut().free(ptr)
  }

  pub fn wrapped_malloc(
    &self,
    size: usize,
  ) -> *mut u8 {
    self.inner.lock().malloc(size)
  }

  pub fn wrapped_free(
    &self,
    ptr: *mut u8,
  ) -> Result<()> {
    self.inner.lock().free(ptr)
  }

  pub fn verify(
    &self,
    ptr: *const u8,
  ) -> Result<Header> {
    self.inner.lock().verify(ptr)
  }

  pub fn stats(&self) -> HeapStats {
    self.inner.lock().stats()
  }

  /// Runs `f` with exclusive access to the heap.
  pub fn with<R>(
    &self,
    f: impl FnOnce(&mut WrappedAllocator) -> R,
  ) -> R {
    f(&mut self.inner.lock())
  }

  pub fn into_inner(self) -> WrappedAllocator {
    self.inner.into_inner()
  }
}
