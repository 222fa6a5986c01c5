use std::ptr::NonNull;

use parking_lot::{Mutex, MutexGuard};

use crate::{
    allocator::Allocator,
    error::{AllocError, FreeError},
    kernel::HeapSource,
};

/// An [`Allocator`] behind a single lock, so it can be shared between
/// threads. Every operation holds the lock for its whole duration.
pub struct Locked<S: HeapSource> {
    inner: Mutex<Allocator<S>>,
}

impl<S: HeapSource> Locked<S> {
    pub fn new(allocator: Allocator<S>) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.inner.lock().allocate(size)
    }

    /// See [`Allocator::deallocate`].
    ///
    /// **SAFETY**: same as [`Allocator::deallocate`].
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        unsafe { self.inner.lock().deallocate(ptr) }
    }

    /// See [`Allocator::try_deallocate`].
    ///
    /// **SAFETY**: same as [`Allocator::deallocate`].
    pub unsafe fn try_deallocate(&self, ptr: *mut u8) -> Result<(), FreeError> {
        unsafe { self.inner.lock().try_deallocate(ptr) }
    }

    /// Exclusive access for several operations in a row, e.g. to dump the
    /// block list while nothing else can change it.
    pub fn lock(&self) -> MutexGuard<'_, Allocator<S>> {
        self.inner.lock()
    }

    pub fn into_inner(self) -> Allocator<S> {
        self.inner.into_inner()
    }
}
