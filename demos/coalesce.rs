//! Frees three neighbouring blocks one by one and shows them merging into a
//! single free region.

use std::io;

use brkalloc::{Allocator, HeapSource};
use tracing_subscriber::EnvFilter;

fn dump<S: HeapSource>(label: &str, allocator: &Allocator<S>) {
    println!("\n{label}:");
    if let Err(err) = allocator.dump_blocks(&mut io::stdout()) {
        eprintln!("failed to dump blocks: {err}");
    }
}

fn run<S: HeapSource>(mut allocator: Allocator<S>) -> Result<(), brkalloc::AllocError> {
    println!("=== Coalescing demo ===");

    let a = allocator.allocate(32)?.as_ptr();
    let b = allocator.allocate(32)?.as_ptr();
    let c = allocator.allocate(32)?.as_ptr();

    unsafe {
        a.write_bytes(0xA1, 32);
        b.write_bytes(0xB2, 32);
        c.write_bytes(0xC3, 32);
    }

    dump("After allocating a,b,c", &allocator);

    unsafe { allocator.deallocate(b) };
    dump("After freeing b (middle)", &allocator);

    unsafe { allocator.deallocate(c) };
    dump("After freeing c (b + c should coalesce)", &allocator);

    unsafe { allocator.deallocate(a) };
    dump("After freeing a (should coalesce into one free region)", &allocator);

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
