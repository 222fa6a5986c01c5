//! Frees a large block and reallocates a small one inside it, leaving a free
//! remainder behind.

use std::io;

use brkalloc::{AllocError, Allocator, HeapSource};
use tracing_subscriber::EnvFilter;

fn run<S: HeapSource>(mut allocator: Allocator<S>) -> Result<(), AllocError> {
    println!("=== Splitting demo ===");

    let big = allocator.allocate(128)?.as_ptr();
    unsafe { big.write_bytes(0xAA, 128) };

    println!("\nAfter allocating big (128):");
    if let Err(err) = allocator.dump_blocks(&mut io::stdout()) {
        eprintln!("failed to dump blocks: {err}");
    }

    unsafe { allocator.deallocate(big) };
    println!("\nAfter freeing big (should be one large free block):");
    if let Err(err) = allocator.dump_blocks(&mut io::stdout()) {
        eprintln!("failed to dump blocks: {err}");
    }

    let small = allocator.allocate(16)?.as_ptr();
    unsafe { small.write_bytes(0xBB, 16) };

    println!("\nAfter allocating small (16) into free block (should split):");
    if let Err(err) = allocator.dump_blocks(&mut io::stdout()) {
        eprintln!("failed to dump blocks: {err}");
    }

    println!("small == big? {}", small == big);

    unsafe { allocator.deallocate(small) };

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

    if let Err(err) = result {
        eprintln!("{err}");
    }
}
