//! Alignment arithmetic shared by every part of the allocator.

/// Every payload pointer and every block size is a multiple of this.
pub const ALIGNMENT: usize = 16;

/// It aligns `to_be_aligned` using `alignment`, which must be a power of two.
///
/// This is used to round block sizes up to [`ALIGNMENT`] and region sizes up
/// to the page size. The bit mask only works because `alignment - 1` is all
/// ones below the alignment bit.
#[inline]
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Same as [`align`] but returns `None` instead of overflowing.
#[inline]
pub const fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    match to_be_aligned.checked_add(alignment - 1) {
        Some(value) => Some(value & !(alignment - 1)),
        None => None,
    }
}

/// Returns `true` if `ptr` sits on an [`ALIGNMENT`] boundary.
#[inline]
pub fn is_aligned(ptr: *const u8) -> bool {
    (ptr as usize) % ALIGNMENT == 0
}
