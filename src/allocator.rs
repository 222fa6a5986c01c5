use std::{io, ptr, ptr::NonNull};

use tracing::{debug, trace, warn};

#[cfg(unix)]
use crate::kernel::Sbrk;
use crate::{
    block::{BLOCK_HEADER_SIZE, Block},
    error::{AllocError, FreeError},
    kernel::HeapSource,
    list::Iter,
    utils::{ALIGNMENT, align, checked_align, is_aligned},
};

/// First-fit allocator over a single growable heap.
///
/// Every block lives in one singly linked list ordered by address:
///
/// ```text
///  heap_start                                                   heap_end
///  +--------+--------+  +--------+--------+  +--------+--------+
///  | header |  used  |->| header |  free  |->| header |  used  |-> null
///  +--------+--------+  +--------+--------+  +--------+--------+
/// ```
///
/// Allocation takes the first free block that is large enough, splitting off
/// whatever it does not need. If none fits, the heap grows by exactly one
/// new block. Deallocation marks the block free and merges it with free
/// neighbours. The heap never shrinks.
///
/// The allocator is an explicit context: each instance owns its own list and
/// [`HeapSource`]. It is not thread safe, see [`crate::Locked`] for that.
pub struct Allocator<S: HeapSource> {
    source: S,
    /// First block in the list, null until the first allocation.
    head: *mut Block,
    /// Break observed by the first allocation, used to validate frees.
    heap_start: *mut u8,
    /// End of the last region obtained from `source`.
    heap_end: *mut u8,
}

// Blocks are only reachable through the allocator, so moving it moves
// exclusive ownership of the heap with it.
unsafe impl<S: HeapSource + Send> Send for Allocator<S> {}

/// Summary of the heap, see [`Allocator::stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub blocks: usize,
    pub free_blocks: usize,
    /// Payload bytes of in-use blocks.
    pub used_bytes: usize,
    /// Payload bytes of free blocks.
    pub free_bytes: usize,
    /// Bytes between `heap_start` and `heap_end`.
    pub heap_size: usize,
}

#[cfg(unix)]
impl Allocator<Sbrk> {
    /// Allocator backed by the process break.
    ///
    /// The break is process wide and unsynchronized, so the returned
    /// allocator stays on the thread that created it.
    pub const fn new() -> Self {
        Self::with_source(Sbrk::new())
    }
}

#[cfg(unix)]
impl Default for Allocator<Sbrk> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: HeapSource> Allocator<S> {
    /// Creates an empty allocator that will grow `source` on demand.
    pub const fn with_source(source: S) -> Self {
        Self {
            source,
            head: ptr::null_mut(),
            heap_start: ptr::null_mut(),
            heap_end: ptr::null_mut(),
        }
    }

    /// Returns a pointer to at least `size` bytes aligned to [`ALIGNMENT`].
    ///
    /// The content of the memory is unspecified. A request of 0 bytes yields a
    /// unique pointer that must not be written through. On failure the block
    /// list is left exactly as it was.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if self.heap_start.is_null() {
            let brk = self.source.brk();
            self.heap_start = brk.wrapping_add(align(brk as usize, ALIGNMENT) - brk as usize);
        }

        let aligned_size =
            checked_align(size, ALIGNMENT).ok_or(AllocError::OutOfAddressSpace { requested: size })?;

        trace!(size, aligned_size, "allocate");

        unsafe {
            if self.head.is_null() {
                let block = self.grow(aligned_size)?;
                self.head = block;

                return Ok(payload(block));
            }

            let mut current = self.head;
            let mut last = ptr::null_mut();

            // First fit: the first free block big enough wins.
            while !current.is_null() {
                if (*current).is_free && (*current).size >= aligned_size {
                    trace!(block = ?current, available = (*current).size, "reusing free block");

                    let block = Block::split(current, aligned_size);

                    return Ok(payload(block));
                }

                last = current;
                current = (*current).next;
            }

            let block = self.grow(aligned_size)?;
            (*last).next = block;

            Ok(payload(block))
        }
    }

    /// Releases the block behind `ptr` and merges it with free neighbours.
    ///
    /// Null pointers, pointers this allocator never returned, misaligned
    /// pointers and double frees are ignored. Use
    /// [`Allocator::try_deallocate`] to find out which one it was.
    ///
    /// **SAFETY**: if `ptr` was returned by this allocator, the caller must
    /// not use it after this call.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8) {
        if let Err(err) = unsafe { self.try_deallocate(ptr) } {
            warn!(%err, "ignoring invalid deallocation");
        }
    }

    /// Same as [`Allocator::deallocate`] but reports rejected pointers.
    ///
    /// Every check happens before any header is modified, so an `Err` means
    /// the heap is untouched.
    ///
    /// **SAFETY**: same as [`Allocator::deallocate`].
    pub unsafe fn try_deallocate(&mut self, ptr: *mut u8) -> Result<(), FreeError> {
        if ptr.is_null() {
            return Err(FreeError::Null);
        }

        let addr = ptr as usize;
        let header = Block::from_payload(ptr);

        // A payload always sits a full header above some block in the heap.
        let lowest = self.heap_start as usize + BLOCK_HEADER_SIZE;

        if addr < lowest || header as usize >= self.heap_end as usize {
            return Err(FreeError::OutOfRange { addr });
        }

        if !is_aligned(ptr) {
            return Err(FreeError::Misaligned { addr });
        }

        unsafe {
            // Without back links the predecessor needs a walk from the head
            // anyway, the same walk proves the pointer is one of ours.
            let (prev, block) = self.find_block(header).ok_or(FreeError::UnknownBlock { addr })?;

            if (*block).is_free {
                return Err(FreeError::DoubleFree { addr });
            }

            (*block).is_free = true;

            let merged = self.coalesce(prev, block);
            trace!(block = ?merged, size = (*merged).size, "freed");
        }

        Ok(())
    }

    /// Iterates over every block in address order.
    pub fn blocks(&self) -> Iter<'_> {
        Iter::new(self.head)
    }

    /// Writes a human readable listing of the block list to `out`.
    pub fn dump_blocks<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Blocks list:")?;

        for block in self.blocks() {
            writeln!(out, "  {block}")?;
        }

        Ok(())
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            heap_size: (self.heap_end as usize).saturating_sub(self.heap_start as usize),
            ..HeapStats::default()
        };

        for block in self.blocks() {
            stats.blocks += 1;

            if block.is_free {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
            } else {
                stats.used_bytes += block.size;
            }
        }

        stats
    }

    /// Start of the managed heap, null before the first allocation.
    pub fn heap_start(&self) -> *const u8 {
        self.heap_start
    }

    /// End of the memory obtained from the source so far.
    pub fn heap_end(&self) -> *const u8 {
        self.heap_end
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Asks the source for a new in-use block of `size` payload bytes.
    ///
    /// If the current break is not aligned, the padding needed to align it is
    /// requested in the same call so that a failure leaves nothing behind.
    unsafe fn grow(&mut self, size: usize) -> Result<*mut Block, AllocError> {
        let brk = self.source.brk() as usize;
        let padding = align(brk, ALIGNMENT) - brk;

        let increment = BLOCK_HEADER_SIZE
            .checked_add(size)
            .and_then(|total| total.checked_add(padding))
            .ok_or(AllocError::OutOfAddressSpace { requested: size })?;

        unsafe {
            let addr = self
                .source
                .grow(increment)
                .ok_or(AllocError::OutOfAddressSpace { requested: increment })?;

            let block = addr.as_ptr().add(padding).cast::<Block>();
            block.write(Block::new(size));

            self.heap_end = addr.as_ptr().add(increment);

            debug!(increment, block = ?block, heap_end = ?self.heap_end, "grew heap");

            Ok(block)
        }
    }

    /// Walks the list looking for `target`, returning it together with its
    /// predecessor (null for the head).
    unsafe fn find_block(&self, target: *mut Block) -> Option<(*mut Block, *mut Block)> {
        let mut prev = ptr::null_mut();
        let mut current = self.head;

        unsafe {
            while !current.is_null() {
                if current == target {
                    return Some((prev, current));
                }

                // The list is address ordered, nothing further can match.
                if current > target {
                    return None;
                }

                prev = current;
                current = (*current).next;
            }
        }

        None
    }

    /// Merges the free `block` with the free blocks that follow it, then with
    /// `prev` if that one is free too. Returns the block that now heads the
    /// merged region.
    ///
    /// Forward merging is cheap through `next`. Backward merging relies on
    /// the caller having found `prev` with a walk from the head: the list
    /// keeps one link per block and pays for it here.
    unsafe fn coalesce(&mut self, prev: *mut Block, block: *mut Block) -> *mut Block {
        unsafe {
            while Block::merge_with_next(block) {
                trace!(block = ?block, size = (*block).size, "merged with next block");
            }

            if !prev.is_null() && (*prev).is_free && Block::merge_with_next(prev) {
                trace!(block = ?prev, size = (*prev).size, "merged into previous block");
                return prev;
            }

            block
        }
    }
}

#[inline]
fn payload(block: *mut Block) -> NonNull<u8> {
    // Headers never sit at address zero, so neither do payloads.
    unsafe { NonNull::new_unchecked(Block::payload(block)) }
}
