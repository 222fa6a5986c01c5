use brkalloc::{ALIGNMENT, Allocator, BLOCK_HEADER_SIZE, Region, align, is_aligned};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..512).prop_map(Op::Allocate),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

struct Live {
    ptr: *mut u8,
    size: usize,
    pattern: u8,
}

/// Structural invariants of the block list for a contiguous source.
fn check_heap(allocator: &Allocator<Region>) {
    let blocks: Vec<_> = allocator.blocks().collect();
    let mut expected = allocator.heap_start();
    let mut previous_free = false;

    for block in &blocks {
        assert_eq!(expected, block.addr, "blocks must be contiguous");
        assert_eq!(0, block.size % ALIGNMENT);
        assert!(is_aligned(block.payload()));
        assert!(!(previous_free && block.is_free), "adjacent free blocks");

        previous_free = block.is_free;
        expected = block.payload().wrapping_add(block.size);
    }

    if !blocks.is_empty() {
        assert_eq!(allocator.heap_end(), expected);
        assert!(blocks.last().unwrap().next.is_null());
    }
}

/// The in-use blocks are exactly the live allocations, nothing was swallowed
/// by a neighbour.
fn check_live(allocator: &Allocator<Region>, live: &[Live]) {
    let used: Vec<_> = allocator.blocks().filter(|block| !block.is_free).collect();
    assert_eq!(live.len(), used.len());

    let mut held = 0;

    for allocation in live {
        let block = used
            .iter()
            .find(|block| block.payload() == allocation.ptr.cast_const())
            .expect("live pointer is not the payload of an in-use block");

        assert!(block.size >= align(allocation.size, ALIGNMENT));
        held += block.size;
    }

    // Reused blocks keep leftovers too small to split, so a block may be
    // larger than the request but every used byte belongs to a live pointer.
    let requested: usize = live.iter().map(|allocation| align(allocation.size, ALIGNMENT)).sum();
    let used_bytes = allocator.stats().used_bytes;

    assert_eq!(held, used_bytes);
    assert!(used_bytes >= requested);
}

fn check_pattern(live: &Live) {
    for i in 0..live.size {
        assert_eq!(live.pattern, unsafe { *live.ptr.add(i) });
    }
}

proptest! {
    #[test]
    fn random_workload_keeps_invariants(ops in proptest::collection::vec(op(), 1..200)) {
        let mut allocator = Allocator::with_source(Region::new(1024 * 1024).unwrap());
        let mut live: Vec<Live> = Vec::new();

        for (step, op) in ops.into_iter().enumerate() {
            match op {
                Op::Allocate(size) => {
                    let ptr = allocator.allocate(size).unwrap().as_ptr();
                    prop_assert!(is_aligned(ptr));

                    for other in &live {
                        let disjoint = unsafe {
                            ptr.add(size) <= other.ptr || other.ptr.add(other.size) <= ptr
                        };
                        prop_assert!(disjoint, "overlapping allocations");
                    }

                    let pattern = step as u8;
                    unsafe { ptr.write_bytes(pattern, size) };
                    live.push(Live { ptr, size, pattern });
                }
                Op::Free(index) if !live.is_empty() => {
                    let victim = live.swap_remove(index % live.len());
                    check_pattern(&victim);
                    unsafe { allocator.try_deallocate(victim.ptr).unwrap() };
                }
                Op::Free(_) => {}
            }

            check_heap(&allocator);
            check_live(&allocator, &live);

            for remaining in &live {
                check_pattern(remaining);
            }
        }

        for remaining in live.drain(..) {
            unsafe { allocator.try_deallocate(remaining.ptr).unwrap() };
        }

        check_heap(&allocator);

        let stats = allocator.stats();
        prop_assert_eq!(0, stats.used_bytes);
        prop_assert!(stats.blocks <= 1);
    }

    #[test]
    fn allocations_are_aligned(sizes in proptest::collection::vec(1usize..4096, 1..32)) {
        let mut allocator = Allocator::with_source(Region::new(1024 * 1024).unwrap());

        for size in sizes {
            let ptr = allocator.allocate(size).unwrap();
            prop_assert_eq!(0, ptr.as_ptr() as usize % 16);
        }
    }
}

#[test]
fn alternating_reuse_does_not_grow_heap() {
    let mut allocator = Allocator::with_source(Region::new(64 * 1024).unwrap());

    let keep = allocator.allocate(24).unwrap();
    let first = allocator.allocate(100).unwrap();
    unsafe { allocator.deallocate(first.as_ptr()) };
    let heap_end = allocator.heap_end();

    for _ in 0..1000 {
        let ptr = allocator.allocate(100).unwrap();
        assert_eq!(first, ptr);
        unsafe { allocator.deallocate(ptr.as_ptr()) };
    }

    assert_eq!(heap_end, allocator.heap_end());
    unsafe { allocator.deallocate(keep.as_ptr()) };
}

#[test]
fn coalesced_region_serves_larger_request() {
    let mut allocator = Allocator::with_source(Region::new(64 * 1024).unwrap());

    let _a = allocator.allocate(32).unwrap();
    let b = allocator.allocate(32).unwrap();
    let c = allocator.allocate(32).unwrap();
    let heap_end = allocator.heap_end();

    unsafe {
        allocator.deallocate(b.as_ptr());
        allocator.deallocate(c.as_ptr());
    }

    let free: Vec<_> = allocator.blocks().filter(|block| block.is_free).collect();
    assert_eq!(1, free.len());
    assert!(free[0].size >= 64 + BLOCK_HEADER_SIZE);

    let d = allocator.allocate(48).unwrap();

    assert_eq!(b, d);
    assert_eq!(heap_end, allocator.heap_end());
}

#[test]
fn foreign_pointers_are_ignored() {
    let mut first = Allocator::with_source(Region::new(4096).unwrap());
    let mut second = Allocator::with_source(Region::new(4096).unwrap());

    let ours = first.allocate(32).unwrap();
    let theirs = second.allocate(32).unwrap();
    let before: Vec<_> = first.blocks().collect();

    unsafe {
        first.deallocate(theirs.as_ptr());
        first.deallocate(std::ptr::null_mut());
        first.deallocate(ours.as_ptr().add(3));
    }

    assert_eq!(before, first.blocks().collect::<Vec<_>>());

    unsafe {
        first.deallocate(ours.as_ptr());
        second.deallocate(theirs.as_ptr());
    }

    assert!(first.blocks().all(|block| block.is_free));
    assert!(second.blocks().all(|block| block.is_free));
}
