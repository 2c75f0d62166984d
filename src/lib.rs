//! # rmalloc - A Free-List Heap with Raw and Checked Allocations
//!
//! This crate provides a small **first-fit free-list allocator** that carves
//! every block out of one fixed arena mapped with `mmap`, and puts two
//! allocation styles on top of it.
//!
//! ## Overview
//!
//! ```text
//!   Layering:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │  WrappedAllocator   size + magic header, checked on every release    │
//!   ├──────────────────────────────────────────────────────────────────────┤
//!   │  SimpleAllocator    raw 8-byte aligned pointers, nothing visible     │
//!   ├──────────────────────────────────────────────────────────────────────┤
//!   │  FreeListAllocator  first fit, split, coalesce                       │
//!   ├──────────────────────────────────────────────────────────────────────┤
//!   │  HeapArena          one fixed mmap reservation + bump cursor         │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rmalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── arena      - HeapArena: the mapping, its cursor and byte access
//!   ├── block      - Block tag and free block records (internal layout)
//!   ├── config     - HeapConfig, env overrides
//!   ├── error      - AllocError
//!   ├── free_list  - FreeListAllocator, HeapStats
//!   ├── simple     - SimpleAllocator
//!   ├── wrapped    - WrappedAllocator, Header
//!   ├── locked     - LockedHeap (mutex around one heap)
//!   ├── ffi        - simple_malloc / simple_free / wrapped_malloc / wrapped_free
//!   └── logging    - tracing subscriber setup
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rmalloc::{HeapConfig, WrappedAllocator};
//!
//! let mut heap = WrappedAllocator::new(&HeapConfig::new(64 * 1024)).unwrap();
//!
//! let ptr = heap.malloc(24) as *mut u64;
//! unsafe { ptr.write(42) };
//!
//! assert_eq!(heap.verify(ptr as *const u8).unwrap().size, 24);
//! heap.free(ptr as *mut u8).unwrap();
//! ```
//!
//! ## How It Works
//!
//! Every block begins with an 8-byte tag holding the block's size; the caller
//! gets the address right after it:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────┬────────────────────────────────────┐
//!   │    Block Tag      │            Payload                 │
//!   │  ┌─────────────┐  │                                    │
//!   │  │ size: N + 8 │  │  ┌──────────────────────────────┐  │
//!   │  └─────────────┘  │  │   N bytes (rounded up to 8)  │  │
//!   │      8 bytes      │  └──────────────────────────────┘  │
//!   └───────────────────┴────────────────────────────────────┘
//!                       ▲
//!                       └── Pointer returned to user
//! ```
//!
//! Free blocks live in an address-ordered list kept outside the arena. A
//! request takes the first block that is large enough, splitting off the tail
//! when the leftover is worth keeping. A release puts the block back in order
//! and merges it with free neighbours on either side:
//!
//! ```text
//!   free(B):
//!
//!   before  ┌────────┬────────┬────────┐        after  ┌──────────────────────────┐
//!           │ free A │ live B │ free C │   ──►         │        free A+B+C        │
//!           └────────┴────────┴────────┘               └──────────────────────────┘
//! ```
//!
//! Only when no free block fits does the arena cursor move up; a free block
//! sitting right below the cursor is grown rather than left behind. The arena is
//! never grown: once the cursor hits the end, requests that the free list
//! cannot serve come back as null.
//!
//! ## Features
//!
//! - **8-byte alignment** for every pointer handed out
//! - **Eager coalescing** of neighbouring free blocks
//! - **Header checks**: corrupted headers and double releases are reported
//! - **Isolated heaps**: each allocator owns its arena; dropping it unmaps it
//! - **C ABI**: `cdylib` exports over one process-wide heap
//!
//! ## Limitations
//!
//! - **Fixed capacity**: one reservation, sized by [`HeapConfig`]
//! - **Single-threaded core**: share a heap through [`LockedHeap`]
//! - **Unix-only**: requires `libc` and `mmap`

pub mod align;
pub mod arena;
pub mod block;
pub mod config;
pub mod error;
pub mod ffi;
pub mod free_list;
pub mod locked;
pub mod logging;
pub mod simple;
pub mod wrapped;

pub use arena::HeapArena;
pub use config::HeapConfig;
pub use error::{AllocError, Result};
pub use ffi::{simple_free, simple_malloc, wrapped_free, wrapped_malloc};
pub use free_list::{FreeListAllocator, HeapStats};
pub use locked::LockedHeap;
pub use simple::SimpleAllocator;
pub use wrapped::{Header, MAGIC, WRAPPED_OVERHEAD, WrappedAllocator};
