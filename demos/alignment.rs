//! Allocates a handful of odd sizes and shows that every returned pointer
//! lands on a 16-byte boundary.

use std::io;

use brkalloc::{ALIGNMENT, AllocError, Allocator, HeapSource, is_aligned};
use tracing_subscriber::EnvFilter;

fn row(name: &str, ptr: *mut u8) {
    println!(
        "{name:<6} {ptr:p}   mod16={:2}   aligned={}",
        ptr as usize % ALIGNMENT,
        if is_aligned(ptr) { "YES" } else { "NO" }
    );
}

fn run<S: HeapSource>(mut allocator: Allocator<S>) -> Result<(), AllocError> {
    println!("=== Alignment demo (16-byte) ===");

    let sizes = [1, 7, 16, 31, 64];
    let mut ptrs = Vec::with_capacity(sizes.len());

    for (i, size) in sizes.into_iter().enumerate() {
        let ptr = allocator.allocate(size)?;
        row(&format!("p{}", i + 1), ptr.as_ptr());
        ptrs.push(ptr);
    }

    println!();
    if let Err(err) = allocator.dump_blocks(&mut io::stdout()) {
        eprintln!("failed to dump blocks: {err}");
    }

    for ptr in ptrs {
        unsafe { allocator.deallocate(ptr.as_ptr()) };
    }

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
