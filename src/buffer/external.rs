//! External (off-heap) allocation strategies.
//!
//! The buffer allocator never talks to a concrete allocator directly; it goes
//! through [`ExternalAllocator`] so the backing strategy can be picked once at
//! process start.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Alignment used by [`System`] for every region.
const SYSTEM_ALIGN: usize = 16;

/// A source of raw, zero-initialised byte regions living outside owned memory.
pub trait ExternalAllocator: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Allocate `len` zeroed bytes. `len` is never zero.
    ///
    /// Returns `None` if the allocator cannot satisfy the request.
    fn allocate(&self, len: usize) -> Option<NonNull<u8>>;

    /// Return a region to the allocator.
    ///
    /// # Safety
    /// `ptr` must come from `allocate(len)` on this allocator and must not
    /// have been freed already.
    unsafe fn free(&self, ptr: NonNull<u8>, len: usize);
}

/// libc `calloc`/`free`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Malloc;

impl ExternalAllocator for Malloc {
    fn name(&self) -> &'static str {
        "malloc"
    }

    fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        let ptr = unsafe { libc::calloc(len, 1) } as *mut u8;
        NonNull::new(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, _len: usize) {
        unsafe { libc::free(ptr.as_ptr() as *mut libc::c_void) };
    }
}

/// The Rust global allocator, addressed through raw layouts.
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

impl ExternalAllocator for System {
    fn name(&self) -> &'static str {
        "system"
    }

    fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(len, SYSTEM_ALIGN).ok()?;
        NonNull::new(unsafe { alloc_zeroed(layout) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, len: usize) {
        // The layout was valid when the region was allocated.
        unsafe {
            let layout = Layout::from_size_align_unchecked(len, SYSTEM_ALIGN);
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(allocator: &dyn ExternalAllocator) {
        let len = 4096;
        let ptr = allocator.allocate(len).expect("allocation failed");
        let region = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) };
        assert!(region.iter().all(|&b| b == 0));
        region[0] = 1;
        region[len - 1] = 2;
        unsafe { allocator.free(ptr, len) };
    }

    #[test]
    fn test_malloc_roundtrip() {
        exercise(&Malloc);
        assert_eq!(Malloc.name(), "malloc");
    }

    #[test]
    fn test_system_roundtrip() {
        exercise(&System);
        assert_eq!(System.name(), "system");
    }
}
