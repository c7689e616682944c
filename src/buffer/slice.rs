//! Fixed-size byte buffer handle.

use super::Shared;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::trace;

/// An exclusively owned, fixed-size byte buffer.
///
/// A slice is either *managed* (an ordinary boxed allocation) or *external*
/// (obtained from an [`ExternalAllocator`](super::ExternalAllocator) and
/// counted against the allocator's byte budget). External memory goes back to
/// its allocator on [`release`](Slice::release) or, failing that, on drop.
pub struct Slice {
    repr: Repr,
}

enum Repr {
    Managed(Box<[u8]>),
    External(External),
}

struct External {
    ptr: NonNull<u8>,
    len: usize,
    /// Taken on release so the budget is decremented exactly once.
    owner: Option<Arc<Shared>>,
}

// The region is owned exclusively by this handle; `&Slice` only exposes `&[u8]`.
unsafe impl Send for External {}
unsafe impl Sync for External {}

impl Slice {
    /// Zeroed managed slice of `len` bytes.
    pub fn managed(len: usize) -> Self {
        Self {
            repr: Repr::Managed(vec![0u8; len].into_boxed_slice()),
        }
    }

    pub(super) fn external(ptr: NonNull<u8>, len: usize, owner: Arc<Shared>) -> Self {
        Self {
            repr: Repr::External(External {
                ptr,
                len,
                owner: Some(owner),
            }),
        }
    }

    /// Size of the slice in bytes. Zero once an external slice is released.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Managed(buf) => buf.len(),
            Repr::External(ext) if ext.owner.is_some() => ext.len,
            Repr::External(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the memory came from the external allocator.
    pub fn is_external(&self) -> bool {
        matches!(self.repr, Repr::External(_))
    }

    /// Return external memory to its allocator now.
    ///
    /// Idempotent: managed slices are untouched, and an external slice is
    /// freed and uncounted only on the first call. The slice is empty
    /// afterwards.
    pub fn release(&mut self) {
        if let Repr::External(ext) = &mut self.repr {
            if let Some(owner) = ext.owner.take() {
                unsafe { owner.strategy.free(ext.ptr, ext.len) };
                owner.uncount(ext.len);
                trace!(len = ext.len, allocator = owner.strategy.name(), "Released external slice");
            }
        }
    }
}

impl Deref for Slice {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.repr {
            Repr::Managed(buf) => &buf[..],
            Repr::External(ext) if ext.owner.is_some() => unsafe {
                std::slice::from_raw_parts(ext.ptr.as_ptr(), ext.len)
            },
            Repr::External(_) => &[],
        }
    }
}

impl DerefMut for Slice {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.repr {
            Repr::Managed(buf) => &mut buf[..],
            Repr::External(ext) if ext.owner.is_some() => unsafe {
                std::slice::from_raw_parts_mut(ext.ptr.as_ptr(), ext.len)
            },
            Repr::External(_) => &mut [],
        }
    }
}

impl AsRef<[u8]> for Slice {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl AsMut<[u8]> for Slice {
    fn as_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl Drop for Slice {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("len", &self.len())
            .field("external", &self.is_external())
            .finish()
    }
}
