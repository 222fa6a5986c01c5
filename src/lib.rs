//! A first-fit memory allocator that manages its own heap.
//!
//! Memory comes straight from a growable region (the process break through
//! `sbrk`, or a private reserved [`Region`]) and is carved into blocks, each
//! preceded by a small header:
//!
//! ```text
//! +-------------------------------+
//! | Header   | Actual memory block |
//! +-------------------------------+
//!            ^ returned pointer, 16-byte aligned
//! ```
//!
//! Freed blocks are reused first-fit, split when they are larger than needed
//! and merged with free neighbours to fight fragmentation.
//!
//! ```rust
//! use brkalloc::{Allocator, Region};
//!
//! let mut allocator = Allocator::with_source(Region::new(4096).unwrap());
//!
//! let ptr = allocator.allocate(64).unwrap();
//! assert!(brkalloc::is_aligned(ptr.as_ptr()));
//!
//! unsafe { allocator.deallocate(ptr.as_ptr()) };
//! ```

mod allocator;
mod block;
mod error;
mod kernel;
mod list;
mod sync;
mod utils;

pub use allocator::{Allocator, HeapStats};
pub use error::{AllocError, FreeError};
#[cfg(unix)]
pub use kernel::Sbrk;
pub use kernel::{HeapSource, Region};
pub use list::{BlockInfo, Iter};
pub use sync::Locked;
pub use utils::{ALIGNMENT, align, is_aligned};

/// Size of the metadata in front of every block.
pub const BLOCK_HEADER_SIZE: usize = block::BLOCK_HEADER_SIZE;
