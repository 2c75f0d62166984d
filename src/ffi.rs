//! C entry points over one lazily created, process-wide heap.
//!
//! Zero-size requests and exhaustion come back as null. A release that finds
//! a corrupted header, an already released block, or a pointer the heap never
//! handed out aborts the process: the heap can no longer be trusted.

use std::{process, ptr};

use libc::c_void;
use once_cell::sync::Lazy;
use tracing::error;

use crate::{config::HeapConfig, error::AllocError, locked::LockedHeap};

static HEAP: Lazy<Option<LockedHeap>> = Lazy::new(|| {
  let config = HeapConfig::from_env();

  LockedHeap::new(&config)
    .inspect_err(|err| error!(%err, capacity = config.arena_capacity, "heap unavailable"))
    .ok()
});

/// The heap behind the C entry points, if it could be created.
pub fn global_heap() -> Option<&'static LockedHeap> {
  HEAP.as_ref()
}

#[unsafe(no_mangle)]
pub extern "C" fn simple_malloc(size: usize) -> *mut c_void {
  match global_heap() {
    Some(heap) => heap.simple_malloc(size).cast(),
    None => ptr::null_mut(),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn simple_free(ptr: *mut c_void) {
  if ptr.is_null() {
    return;
  }

  if let Some(heap) = global_heap() {
    escalate("simple_free", ptr, heap.simple_free(ptr.cast()));
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn wrapped_malloc(size: usize) -> *mut c_void {
  match global_heap() {
    Some(heap) => heap.wrapped_malloc(size).cast(),
    None => ptr::null_mut(),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn wrapped_free(ptr: *mut c_void) {
  if ptr.is_null() {
    return;
  }

  if let Some(heap) = global_heap() {
    escalate("wrapped_free", ptr, heap.wrapped_free(ptr.cast()));
  }
}

fn escalate(
  symbol: &'static str,
  ptr: *mut c_void,
  result: Result<(), AllocError>,
) {
  if let Err(err) = result {
    error!(symbol, ?ptr, %err, "aborting on heap misuse");
    eprintln!("rmalloc: {symbol}({ptr:?}): {err}");
    process::abort();
  }
}
