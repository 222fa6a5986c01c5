use thiserror::Error;

/// Failures of the allocation path. The block list is never modified when one
/// of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The [`crate::HeapSource`] refused to grow, or the request could not
    /// even be expressed as a byte count.
    #[error("out of address space: could not obtain {requested} more bytes")]
    OutOfAddressSpace { requested: usize },
    /// A [`crate::Region`] could not reserve its address range.
    #[error("failed to reserve a region of {capacity} bytes")]
    Reserve { capacity: usize },
}

/// Reasons a pointer handed to [`crate::Allocator::try_deallocate`] was
/// rejected. [`crate::Allocator::deallocate`] ignores all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FreeError {
    #[error("attempted to free a null pointer")]
    Null,
    #[error("pointer {addr:#x} lies outside the managed heap")]
    OutOfRange { addr: usize },
    #[error("pointer {addr:#x} is not aligned to the block alignment")]
    Misaligned { addr: usize },
    #[error("pointer {addr:#x} is not the start of any block")]
    UnknownBlock { addr: usize },
    #[error("block at {addr:#x} is already free")]
    DoubleFree { addr: usize },
}
