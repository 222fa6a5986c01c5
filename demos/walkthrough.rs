//! Walks through the whole life of a heap: allocation, writing, freeing,
//! coalescing, splitting and reuse, printing the block list and the program
//! break at every step.
//!
//! Run with `RUST_LOG=brkalloc=trace` to see the allocator's own events.

use std::io;

use brkalloc::{AllocError, Allocator, HeapSource, is_aligned};
use tracing_subscriber::EnvFilter;

fn step<S: HeapSource>(label: &str, allocator: &Allocator<S>) {
    println!("\n{label}:");
    println!("  break = {:p}", allocator.source().brk());
    if let Err(err) = allocator.dump_blocks(&mut io::stdout()) {
        eprintln!("failed to dump blocks: {err}");
    }
}

fn run<S: HeapSource>(mut allocator: Allocator<S>) -> Result<(), AllocError> {
    let a = allocator.allocate(64)?.as_ptr();
    let b = allocator.allocate(32)?.as_ptr();
    let c = allocator.allocate(48)?.as_ptr();

    step("Initial allocations", &allocator);

    if ![a, b, c].into_iter().all(|ptr| is_aligned(ptr)) {
        eprintln!("Error: allocation not properly aligned.");
        return Ok(());
    }

    unsafe {
        a.write_bytes(0xAA, 64);
        b.write_bytes(0xBB, 32);
        c.write_bytes(0xCC, 48);
    }

    unsafe { allocator.deallocate(b) };
    step("After freeing b (middle block)", &allocator);

    unsafe { allocator.deallocate(c) };
    step("After freeing c (should coalesce with b)", &allocator);

    let d = allocator.allocate(16)?.as_ptr();
    unsafe { d.write_bytes(0xDD, 16) };
    step("Allocate d = 16 bytes (should split free block)", &allocator);

    unsafe { allocator.deallocate(d) };
    step("After freeing d (block should return to free list)", &allocator);

    unsafe { allocator.deallocate(a) };
    step("After freeing a (head block free, heap keeps its size)", &allocator);

    let stats = allocator.stats();
    println!(
        "\n{} block(s), {} free bytes, heap of {} bytes",
        stats.blocks, stats.free_bytes, stats.heap_size
    );

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    #[cfg(unix)]
    let result = run(Allocator::new());

    #[cfg(not(unix))]
    let result = brkalloc::Region::new(1 << 20).and_then(|region| run(Allocator::with_source(region)));

    match result {
        Ok(()) => println!("Allocator walkthrough finished successfully."),
        Err(err) => eprintln!("{err}"),
    }
}
