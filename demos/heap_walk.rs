use std::{env, io::Read};

use rmalloc::{AllocError, HeapConfig, WrappedAllocator, logging};

/// Waits until the user presses ENTER when run with `--step`.
/// Useful for inspecting the mapping with `pmap` or `gdb` between steps.
fn block_until_enter_pressed(step: bool) {
  if !step {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_heap(
  label: &str,
  heap: &WrappedAllocator,
) {
  let stats = heap.stats();
  println!(
    "[{label}] reserved = {} / {} bytes, live = {} blocks ({} bytes), free = {} blocks ({} bytes)",
    stats.reserved,
    stats.capacity,
    stats.live_blocks,
    stats.live_bytes,
    stats.free_blocks,
    stats.free_bytes,
  );

  for (offset, size) in heap.simple().free_list().free_ranges() {
    println!("    free block at offset {offset:#06x}, {size} bytes");
  }
}

fn main() -> Result<(), AllocError> {
  logging::init();

  let step = env::args().any(|arg| arg == "--step");
  let mut heap = WrappedAllocator::new(&HeapConfig::new(64 * 1024))?;

  println!("arena mapped at {:?}", heap.arena().base());
  print_heap("start", &heap);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 1) A u32 and a 12 byte buffer. Each carries a 12 byte header.
  // --------------------------------------------------------------------
  let first = heap.malloc(4);
  let second = heap.malloc(12);
  println!("\n[1] first = {first:?}, second = {second:?}");

  unsafe {
    first.cast::<u32>().write(0xCAFEBABE);
    second.write_bytes(0xAB, 12);
    println!(
      "[1] magic in front of first = {:#X}",
      first.sub(4).cast::<u32>().read_unaligned()
    );
  }
  print_heap("1", &heap);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 2) A larger block, then release the first two. They merge into one.
  // --------------------------------------------------------------------
  let third = heap.malloc(256);
  heap.free(first)?;
  heap.free(second)?;
  println!("\n[2] released first and second, third = {third:?} still live");
  print_heap("2", &heap);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 3) A small request is carved from the front of the merged block.
  // --------------------------------------------------------------------
  let fourth = heap.malloc(2);
  println!(
    "\n[3] fourth = {fourth:?}: {}",
    if fourth == first {
      "reused the merged block"
    } else {
      "came from somewhere else"
    }
  );
  print_heap("3", &heap);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 4) Scribble over third's header and try to release it.
  // --------------------------------------------------------------------
  unsafe { third.sub(4).cast::<u32>().write_unaligned(0) };
  match heap.free(third) {
    Err(err) => println!("\n[4] release refused: {err}"),
    Ok(()) => println!("\n[4] release went through?!"),
  }

  unsafe { third.sub(4).cast::<u32>().write_unaligned(0x1BADB002) };
  if let Err(err) = heap.free(third) {
    println!("[4] release refused: {err} (fatal: {})", err.is_fatal());
  }

  // --------------------------------------------------------------------
  // 5) Drain the arena until it refuses.
  // --------------------------------------------------------------------
  let mut count = 0;
  while !heap.malloc(4096).is_null() {
    count += 1;
  }
  println!("\n[5] {count} more 4 KiB blocks fit before the arena ran out");
  print_heap("5", &heap);

  println!("\n[6] Dropping the heap unmaps the arena.");
  Ok(())
}
