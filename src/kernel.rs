//! The growth primitive the allocator sits on. As the allocator, our top
//! level view of memory has nothing to do with the concrete syscalls offered
//! by each kernel, so everything platform-dependant lives behind
//! [`HeapSource`].

use std::{marker::PhantomData, ptr::NonNull};

use tracing::debug;

use crate::{error::AllocError, utils::align};

/// A contiguous, growable heap with a movable end ("break").
///
/// # Safety
///
/// Implementors must guarantee that, after `grow(n)` returned `Some(addr)`,
/// the `n` bytes starting at `addr` are readable, writable and owned by the
/// caller for as long as the source is alive, and that later growth never
/// hands out the same bytes again.
pub unsafe trait HeapSource {
    /// Current end of the heap. Never moves unless [`HeapSource::grow`] is
    /// called (or, for the process break, someone else calls `sbrk`).
    fn brk(&self) -> *mut u8;

    /// Extends the heap by `increment` bytes, returning the previous break,
    /// which is the start of the new memory. Returns `None` when the request
    /// cannot be satisfied, in which case nothing changed.
    ///
    /// **SAFETY**: the returned memory is uninitialized.
    unsafe fn grow(&mut self, increment: usize) -> Option<NonNull<u8>>;
}

/// The process break, moved with `sbrk(2)`.
///
/// Note that the C runtime's own `malloc` may move the break too. The
/// allocator copes with that by never merging blocks across gaps.
///
/// `sbrk` itself is not thread safe: two allocators moving the break from
/// different threads could be handed the same bytes. `Sbrk` is therefore
/// `!Send`, which keeps every `Allocator<Sbrk>` on its creating thread.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Sbrk {
    _not_send: PhantomData<*mut ()>,
}

#[cfg(unix)]
impl Sbrk {
    pub const fn new() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

#[cfg(unix)]
unsafe impl HeapSource for Sbrk {
    fn brk(&self) -> *mut u8 {
        unsafe { libc::sbrk(0).cast() }
    }

    unsafe fn grow(&mut self, increment: usize) -> Option<NonNull<u8>> {
        let increment = libc::intptr_t::try_from(increment).ok()?;

        unsafe {
            let addr = libc::sbrk(increment);

            if addr == usize::MAX as *mut libc::c_void {
                return None;
            }

            NonNull::new(addr.cast())
        }
    }
}

/// A private, fixed-capacity address range with its own simulated break.
///
/// The whole range is reserved up front so that growth is always contiguous,
/// which makes a `Region` behave like a dedicated process heap. This is what
/// lets several independent allocators coexist in one process.
///
/// ```text
/// base                     base + used               base + capacity
///  +--------------------------+--------------------------+
///  |   handed out by grow()   |         reserved         |
///  +--------------------------+--------------------------+
///                             ^ brk()
/// ```
#[derive(Debug)]
pub struct Region {
    base: NonNull<u8>,
    /// Reserved bytes, a multiple of the page size.
    capacity: usize,
    /// Bytes below the simulated break.
    used: usize,
    /// Bytes backed by committed pages. Only windows distinguishes this
    /// from the reservation.
    #[cfg_attr(not(windows), allow(dead_code))]
    committed: usize,
}

// The region exclusively owns its mapping.
unsafe impl Send for Region {}

impl Region {
    /// Reserves `capacity` bytes (rounded up to the page size).
    pub fn new(capacity: usize) -> Result<Self, AllocError> {
        let page_size = page_size();
        let capacity = align(capacity.max(1), page_size);

        let base = unsafe { Region::reserve(capacity) }.ok_or(AllocError::Reserve { capacity })?;

        debug!(base = ?base, capacity, "reserved region");

        Ok(Self {
            base,
            capacity,
            used: 0,
            committed: 0,
        })
    }

    /// Lowest address of the region.
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Total bytes that can ever be handed out.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.used
    }
}

unsafe impl HeapSource for Region {
    fn brk(&self) -> *mut u8 {
        self.base.as_ptr().wrapping_add(self.used)
    }

    unsafe fn grow(&mut self, increment: usize) -> Option<NonNull<u8>> {
        let new_used = self.used.checked_add(increment)?;

        if new_used > self.capacity {
            return None;
        }

        unsafe {
            self.commit(new_used)?;

            let addr = self.base.add(self.used);
            self.used = new_used;

            Some(addr)
        }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe { Region::release(self.base, self.capacity) }
    }
}

/// Returns the virtual memory page size of the computer in bytes.
pub(crate) fn page_size() -> usize {
    platform::page_size()
}

#[cfg(unix)]
mod platform {
    use super::Region;

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    pub(super) fn page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
    }

    impl Region {
        pub(super) unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                if addr == libc::MAP_FAILED {
                    return None;
                }

                NonNull::new(addr.cast::<u8>())
            }
        }

        /// Anonymous mappings are usable as soon as they exist, pages are
        /// faulted in on first touch.
        pub(super) unsafe fn commit(&mut self, _up_to: usize) -> Option<()> {
            Some(())
        }

        pub(super) unsafe fn release(base: NonNull<u8>, len: usize) {
            unsafe {
                munmap(base.as_ptr().cast::<c_void>(), len as size_t);
            }
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::Region;

    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::{Memory, SystemInformation};

    use crate::utils::align;

    pub(super) fn page_size() -> usize {
        unsafe {
            let mut system_info = MaybeUninit::uninit();
            SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

            system_info.assume_init().dwPageSize as usize
        }
    }

    impl Region {
        pub(super) unsafe fn reserve(len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let addr = Memory::VirtualAlloc(None, len, Memory::MEM_RESERVE, Memory::PAGE_NOACCESS);

                NonNull::new(addr.cast())
            }
        }

        /// Commits whole pages until `up_to` bytes of the region are backed.
        pub(super) unsafe fn commit(&mut self, up_to: usize) -> Option<()> {
            if up_to <= self.committed {
                return Some(());
            }

            let target = align(up_to, page_size()).min(self.capacity);
            let len = target - self.committed;

            unsafe {
                let start = self.base.as_ptr().add(self.committed);
                let addr = Memory::VirtualAlloc(
                    Some(start as *const c_void),
                    len,
                    Memory::MEM_COMMIT,
                    Memory::PAGE_READWRITE,
                );

                if addr.is_null() {
                    return None;
                }
            }

            self.committed = target;

            Some(())
        }

        pub(super) unsafe fn release(base: NonNull<u8>, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(base.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_rounds_to_pages() {
        let region = Region::new(100).unwrap();

        assert_eq!(page_size(), region.capacity());
        assert_eq!(0, region.used());
        assert_eq!(region.base(), region.brk());
    }

    #[test]
    fn region_grows_contiguously() {
        let mut region = Region::new(4096).unwrap();

        unsafe {
            let first = region.grow(64).unwrap();
            let second = region.grow(32).unwrap();

            assert_eq!(region.base(), first.as_ptr());
            assert_eq!(first.as_ptr().add(64), second.as_ptr());
            assert_eq!(second.as_ptr().add(32), region.brk());

            // Memory is writable.
            second.as_ptr().write_bytes(0xAB, 32);
            assert_eq!(0xAB, *second.as_ptr().add(31));
        }
    }

    #[test]
    fn region_refuses_past_capacity() {
        let mut region = Region::new(1).unwrap();
        let capacity = region.capacity();

        unsafe {
            assert!(region.grow(capacity + 1).is_none());
            assert_eq!(0, region.used());

            assert!(region.grow(capacity).is_some());
            assert!(region.grow(1).is_none());
            assert!(region.grow(usize::MAX).is_none());
        }
    }
}
