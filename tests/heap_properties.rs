use std::collections::HashSet;

use proptest::prelude::*;
use rmalloc::{AllocError, HeapConfig, SimpleAllocator, WRAPPED_OVERHEAD, WrappedAllocator};

fn simple() -> SimpleAllocator {
  SimpleAllocator::new(&HeapConfig::new(256 * 1024)).unwrap()
}

fn wrapped() -> WrappedAllocator {
  WrappedAllocator::new(&HeapConfig::new(256 * 1024)).unwrap()
}

#[test]
fn test_every_nonzero_size_is_aligned() {
  let mut heap = simple();

  for size in 1..=256 {
    let ptr = heap.malloc(size);
    assert!(!ptr.is_null(), "size {size}");
    assert_eq!(ptr as usize % 8, 0, "size {size}");
  }
}

#[test]
fn test_boundary_sizes_are_aligned_in_both_facades() {
  let mut raw = simple();
  let mut checked = wrapped();

  for size in [1, 3, 7, 8, 9, 15, 16, 17] {
    assert_eq!(raw.malloc(size) as usize % 8, 0, "simple, size {size}");
    assert_eq!(checked.malloc(size) as usize % 8, 0, "wrapped, size {size}");
  }
}

#[test]
fn test_zero_size_yields_null() {
  assert!(simple().malloc(0).is_null());
  assert!(wrapped().malloc(0).is_null());
}

#[test]
fn test_magic_sits_right_before_pointer() {
  let mut heap = wrapped();

  for size in [1, 24, 100, 4096] {
    let ptr = heap.malloc(size);
    let magic = unsafe { ptr.sub(4).cast::<u32>().read_unaligned() };
    let recorded = unsafe { ptr.sub(12).cast::<u64>().read_unaligned() };

    assert_eq!(magic, 0xDEADBEEF);
    assert_eq!(recorded, size as u64);
  }
}

#[test]
fn test_sequential_wrapped_blocks_do_not_overlap() {
  let mut heap = wrapped();

  let blocks: Vec<usize> = (0..64).map(|_| heap.malloc(16) as usize).collect();

  let distinct: HashSet<_> = blocks.iter().collect();
  assert_eq!(distinct.len(), blocks.len());

  let mut sorted = blocks.clone();
  sorted.sort_unstable();
  for pair in sorted.windows(2) {
    // Each region is 16 user bytes; the next one's header sits in between.
    assert!(pair[0] + 16 + WRAPPED_OVERHEAD <= pair[1]);
  }
}

#[test]
fn test_reuse_respects_alignment() {
  let mut heap = simple();

  let first = heap.malloc(40);
  let _guard = heap.malloc(8);
  heap.free(first).unwrap();

  for size in [1, 17, 33, 40] {
    let ptr = heap.malloc(size);
    assert_eq!(ptr as usize % 8, 0);
    heap.free(ptr).unwrap();
  }
}

#[test]
fn test_adjacent_blocks_merge_without_new_space() {
  let mut heap = simple();

  let a = heap.malloc(64);
  let b = heap.malloc(64);
  let _guard = heap.malloc(8);
  assert_eq!(b as usize - a as usize, 72);

  let reserved = heap.stats().reserved;
  heap.free(a).unwrap();
  heap.free(b).unwrap();
  assert_eq!(heap.stats().free_blocks, 1);

  // Both blocks, tags included, minus the tag of the merged block.
  let merged = heap.malloc(72 + 72 - 8);
  assert_eq!(merged, a);
  assert_eq!(heap.stats().reserved, reserved);
}

#[test]
fn test_wrapped_blocks_merge_too() {
  let mut heap = wrapped();

  let a = heap.malloc(48);
  let b = heap.malloc(48);
  let _guard = heap.malloc(8);
  let reserved = heap.stats().reserved;

  heap.free(b).unwrap();
  heap.free(a).unwrap();

  let merged = heap.malloc(96);
  assert_eq!(merged, a);
  assert_eq!(heap.stats().reserved, reserved);
}

#[test]
fn test_overwritten_magic_is_reported() {
  let mut heap = wrapped();
  let ptr = heap.malloc(32);

  unsafe { ptr.sub(4).cast::<u32>().write_unaligned(0) };
  assert!(matches!(heap.free(ptr), Err(AllocError::DoubleFree { .. })));

  unsafe { ptr.sub(4).cast::<u32>().write_unaligned(0xFEEDFACE) };
  let err = heap.free(ptr).unwrap_err();
  assert!(matches!(err, AllocError::CorruptedHeader { found: 0xFEEDFACE, .. }));
  assert!(err.is_fatal());
}

#[test]
fn test_payload_overrun_is_caught_on_neighbour() {
  let mut heap = wrapped();

  let first = heap.malloc(16);
  let second = heap.malloc(16);

  // Writing past the end of `first` tramples the header of `second`.
  unsafe { first.write_bytes(0xAA, second as usize - first as usize) };

  assert!(heap.free(first).is_ok());
  assert!(matches!(
    heap.free(second),
    Err(AllocError::CorruptedHeader { found: 0xAAAA_AAAA, .. })
  ));
}

#[test]
fn test_double_release_in_both_facades() {
  let mut raw = simple();
  let a = raw.malloc(16);
  let _guard = raw.malloc(16);
  raw.free(a).unwrap();
  assert!(matches!(raw.free(a), Err(AllocError::DoubleFree { .. })));

  let mut checked = wrapped();
  let b = checked.malloc(16);
  checked.free(b).unwrap();
  assert!(matches!(checked.free(b), Err(AllocError::DoubleFree { .. })));
}

#[test]
fn test_exhaustion_is_recoverable() {
  let mut heap = SimpleAllocator::new(&HeapConfig::new(16 * 1024)).unwrap();

  let mut live = Vec::new();
  loop {
    let ptr = heap.malloc(1000);
    if ptr.is_null() {
      break;
    }
    live.push(ptr);
  }
  assert!(!live.is_empty());
  assert!(matches!(heap.try_malloc(1000), Err(AllocError::OutOfMemory { .. })));

  for ptr in live.drain(..) {
    heap.free(ptr).unwrap();
  }
  assert_eq!(heap.stats().free_blocks, 1);
  assert!(!heap.malloc(1000).is_null());
}

#[derive(Clone, Debug)]
enum Op {
  Alloc(usize),
  Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (1usize..512).prop_map(Op::Alloc),
    2 => any::<usize>().prop_map(Op::Free),
  ]
}

proptest! {
  #[test]
  fn free_list_stays_sorted_disjoint_and_coalesced(ops in proptest::collection::vec(op(), 1..200)) {
    let mut heap = SimpleAllocator::new(&HeapConfig::new(1024 * 1024)).unwrap();
    let mut live: Vec<(usize, usize)> = Vec::new();

    for op in ops {
      match op {
        Op::Alloc(size) => {
          let ptr = heap.malloc(size);
          prop_assert!(!ptr.is_null());
          prop_assert_eq!(ptr as usize % 8, 0);
          live.push((ptr as usize, size));
        }
        Op::Free(pick) if !live.is_empty() => {
          let (addr, _) = live.swap_remove(pick % live.len());
          prop_assert!(heap.free(addr as *mut u8).is_ok());
        }
        Op::Free(_) => {}
      }

      let ranges: Vec<_> = heap.free_list().free_ranges().collect();
      for pair in ranges.windows(2) {
        let (offset, size) = pair[0];
        // Strictly below: touching neighbours would have been merged.
        prop_assert!(offset + size < pair[1].0);
      }

      let mut regions = live.clone();
      regions.sort_unstable();
      for pair in regions.windows(2) {
        prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0);
      }

      let stats = heap.stats();
      prop_assert_eq!(stats.free_bytes + stats.live_bytes, stats.reserved);
      prop_assert_eq!(stats.live_blocks, live.len());
    }
  }

  #[test]
  fn wrapped_headers_survive_neighbour_churn(sizes in proptest::collection::vec(1usize..256, 1..64)) {
    let mut heap = WrappedAllocator::new(&HeapConfig::new(1024 * 1024)).unwrap();

    let ptrs: Vec<_> = sizes.iter().map(|&size| heap.malloc(size)).collect();
    for (i, &ptr) in ptrs.iter().enumerate() {
      unsafe { ptr.write_bytes(0xC3, sizes[i]) };
    }

    for (i, &ptr) in ptrs.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
      prop_assert_eq!(heap.verify(ptr).unwrap().size, sizes[i] as u64);
      prop_assert!(heap.free(ptr).is_ok());
    }

    for (i, &ptr) in ptrs.iter().enumerate().filter(|(i, _)| i % 2 == 1) {
      prop_assert_eq!(heap.usable_size(ptr).unwrap(), sizes[i]);
    }
  }
}
