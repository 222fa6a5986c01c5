use std::{mem, ptr};

use crate::utils::{ALIGNMENT, align};

/// Header size of a block rounded up to [`ALIGNMENT`], so that the payload
/// placed right after it starts on an aligned address.
pub(crate) const BLOCK_HEADER_SIZE: usize = align(mem::size_of::<Block>(), ALIGNMENT);

/// Smallest block worth carving out of a larger one: a header plus one
/// aligned unit of payload.
pub(crate) const MIN_BLOCK_SIZE: usize = BLOCK_HEADER_SIZE + ALIGNMENT;

/// This is the structure of a block. The fields of the block are its metadata,
/// content is placed after this header.
///
/// ```text
/// +---------------------+ <------+ <- block address (16-aligned)
/// |        size         |        |
/// +---------------------+        |
/// |    is_free (1b)     |        | -> Header (BLOCK_HEADER_SIZE)
/// +---------------------+        |
/// |        next         |        |
/// +---------------------+ <------+ <- pointer handed to the user
/// |       Content       |        |
/// |         ...         |        | -> `size` bytes of payload
/// |         ...         |        |
/// +---------------------+ <------+ <- next block in memory
/// ```
///
/// Blocks form a singly linked list ordered by address. Every helper here
/// works on raw pointers because the header and its payload are one
/// allocation as far as the heap source is concerned, and a reference to the
/// header alone would not cover the bytes after it.
#[repr(C, align(16))]
pub(crate) struct Block {
    /// Usable bytes after the header, always a multiple of [`ALIGNMENT`].
    pub size: usize,
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
    /// Next block in address order, or null for the tail.
    pub next: *mut Block,
}

impl Block {
    /// A fresh in-use block with no successor.
    pub const fn new(size: usize) -> Self {
        Self {
            size,
            is_free: false,
            next: ptr::null_mut(),
        }
    }

    /// Address handed out to the user for `block`.
    #[inline]
    pub fn payload(block: *mut Block) -> *mut u8 {
        block.cast::<u8>().wrapping_add(BLOCK_HEADER_SIZE)
    }

    /// Inverse of [`Block::payload`]. The result is only meaningful if `ptr`
    /// really is a payload pointer, callers check that before dereferencing.
    #[inline]
    pub fn from_payload(ptr: *mut u8) -> *mut Block {
        ptr.wrapping_sub(BLOCK_HEADER_SIZE).cast()
    }

    /// First byte past the payload of `block`.
    ///
    /// **SAFETY**: `block` must point to an initialized header.
    #[inline]
    pub unsafe fn end(block: *mut Block) -> *mut u8 {
        unsafe { Block::payload(block).wrapping_add((*block).size) }
    }

    /// Whether `other` starts exactly where `block` ends. Blocks coming from
    /// separate growth requests are not always contiguous, and those must
    /// never be merged.
    ///
    /// **SAFETY**: `block` must point to an initialized header.
    #[inline]
    pub unsafe fn is_adjacent(block: *mut Block, other: *mut Block) -> bool {
        unsafe { Block::end(block) == other.cast::<u8>() }
    }

    /// Marks `block` as used, carving a free remainder off its tail when what
    /// is left after `size` bytes can hold at least [`MIN_BLOCK_SIZE`].
    /// Smaller leftovers stay inside the block.
    ///
    /// ```text
    /// before:  | header |               block.size                 |
    /// after:   | header |  size  | header |  block.size - size - H  |
    ///                             ^ new free block
    /// ```
    ///
    /// **SAFETY**: `block` must be a valid header with `size <= block.size`.
    pub unsafe fn split(block: *mut Block, size: usize) -> *mut Block {
        unsafe {
            (*block).is_free = false;

            if (*block).size < size + MIN_BLOCK_SIZE {
                return block;
            }

            let remainder = Block::payload(block).add(size).cast::<Block>();

            remainder.write(Block {
                size: (*block).size - size - BLOCK_HEADER_SIZE,
                is_free: true,
                next: (*block).next,
            });

            (*block).size = size;
            (*block).next = remainder;

            block
        }
    }

    /// Absorbs the next block into `block` if it is free and contiguous.
    /// Returns whether a merge happened.
    ///
    /// **SAFETY**: `block` and its successor (if any) must be valid headers.
    pub unsafe fn merge_with_next(block: *mut Block) -> bool {
        unsafe {
            let next = (*block).next;

            if next.is_null() || !(*next).is_free || !Block::is_adjacent(block, next) {
                return false;
            }

            // We need to cover the header and the actual content of the block
            (*block).size += BLOCK_HEADER_SIZE + (*next).size;
            (*block).next = (*next).next;

            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backing storage with the same alignment as a header.
    #[repr(C, align(16))]
    struct Arena([u8; 512]);

    fn arena() -> Box<Arena> {
        Box::new(Arena([0; 512]))
    }

    unsafe fn place(base: *mut u8, offset: usize, size: usize) -> *mut Block {
        unsafe {
            let block = base.add(offset).cast::<Block>();
            block.write(Block::new(size));
            block
        }
    }

    #[test]
    fn header_is_aligned() {
        assert_eq!(0, BLOCK_HEADER_SIZE % ALIGNMENT);
        assert!(BLOCK_HEADER_SIZE >= mem::size_of::<Block>());
        assert_eq!(BLOCK_HEADER_SIZE + ALIGNMENT, MIN_BLOCK_SIZE);
    }

    #[test]
    fn payload_round_trip() {
        let mut arena = arena();
        let base = arena.0.as_mut_ptr();

        unsafe {
            let block = place(base, 0, 64);
            let payload = Block::payload(block);

            assert_eq!(base.add(BLOCK_HEADER_SIZE), payload);
            assert_eq!(block, Block::from_payload(payload));
            assert_eq!(payload.add(64), Block::end(block));
        }
    }

    #[test]
    fn split_carves_free_remainder() {
        let mut arena = arena();
        let base = arena.0.as_mut_ptr();

        unsafe {
            let block = place(base, 0, 128);
            (*block).is_free = true;

            let used = Block::split(block, 16);
            let remainder = (*used).next;

            assert_eq!(block, used);
            assert!(!(*used).is_free);
            assert_eq!(16, (*used).size);
            assert!(Block::is_adjacent(used, remainder));
            assert!((*remainder).is_free);
            assert_eq!(128 - 16 - BLOCK_HEADER_SIZE, (*remainder).size);
            assert!((*remainder).next.is_null());
        }
    }

    #[test]
    fn split_keeps_small_leftover() {
        let mut arena = arena();
        let base = arena.0.as_mut_ptr();

        unsafe {
            let size = 32 + MIN_BLOCK_SIZE - ALIGNMENT;
            let block = place(base, 0, size);
            (*block).is_free = true;

            Block::split(block, 32);

            assert!(!(*block).is_free);
            assert_eq!(size, (*block).size);
            assert!((*block).next.is_null());
        }
    }

    #[test]
    fn merge_requires_free_and_adjacent() {
        let mut arena = arena();
        let base = arena.0.as_mut_ptr();

        unsafe {
            let first = place(base, 0, 32);
            let second = place(base, BLOCK_HEADER_SIZE + 32, 32);
            (*first).next = second;

            assert!(!Block::merge_with_next(first));

            (*second).is_free = true;
            assert!(Block::merge_with_next(first));
            assert_eq!(64 + BLOCK_HEADER_SIZE, (*first).size);
            assert!((*first).next.is_null());
        }
    }

    #[test]
    fn merge_skips_gap() {
        let mut arena = arena();
        let base = arena.0.as_mut_ptr();

        unsafe {
            let first = place(base, 0, 32);
            let second = place(base, BLOCK_HEADER_SIZE + 64, 32);
            (*first).next = second;
            (*second).is_free = true;

            assert!(!Block::merge_with_next(first));
            assert_eq!(32, (*first).size);
        }
    }
}
