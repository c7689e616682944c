//! Budgeted buffer allocation.
//!
//! Buffers below a size threshold always come from ordinary owned memory.
//! Larger buffers are taken from an external allocator while the total number
//! of outstanding external bytes stays within a configured budget; once the
//! budget is spent (or the allocator refuses) allocation quietly falls back to
//! owned memory.
//!
//! ## Budget accounting
//!
//! Bytes are reserved with a compare-and-swap before the external allocator is
//! called, so the outstanding counter never exceeds the budget, not even
//! transiently. A failed allocation gives its reservation back. The forced
//! path ([`BufferAllocator::allocate_external`]) is still counted but skips
//! the budget check.
//!
//! A process-wide allocator is reachable through [`global`] and the free
//! functions in this module. Independent allocators (with their own counters)
//! can be built for isolation.

mod external;
mod slice;

pub use external::{ExternalAllocator, Malloc, System};
pub use slice::Slice;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, trace};

/// Requests below this size never use the external allocator.
pub const MIN_OFFHEAP_SLICE: usize = 16 * 1024;

/// Errors from the forced external allocation path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The external allocator could not provide the region.
    #[error("external allocator `{allocator}` failed to allocate {len} bytes")]
    External { allocator: &'static str, len: usize },
    /// The process allocator was already initialised.
    #[error("global buffer allocator already installed")]
    AlreadyInstalled,
}

pub(crate) struct Shared {
    outstanding: AtomicUsize,
    max_bytes: AtomicUsize,
    min_slice: AtomicUsize,
    pub(crate) strategy: Box<dyn ExternalAllocator>,
}

impl Shared {
    /// Reserve `len` bytes of budget. Forced reservations always succeed.
    fn reserve(&self, len: usize, force: bool) -> bool {
        if force {
            self.outstanding.fetch_add(len, Ordering::AcqRel);
            return true;
        }
        let max = self.max_bytes.load(Ordering::Acquire);
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(len).filter(|after| *after <= max)
            })
            .is_ok()
    }

    pub(crate) fn uncount(&self, len: usize) {
        self.outstanding.fetch_sub(len, Ordering::AcqRel);
    }
}

/// Allocator for [`Slice`] buffers.
///
/// Cloning is cheap; clones share the counter, budget and strategy.
#[derive(Clone)]
pub struct BufferAllocator {
    shared: Arc<Shared>,
}

impl BufferAllocator {
    /// Allocator over `strategy` with a zero budget.
    pub fn new(strategy: impl ExternalAllocator) -> Self {
        Self::builder().strategy(strategy).build()
    }

    pub fn builder() -> BufferAllocatorBuilder {
        BufferAllocatorBuilder::default()
    }

    /// Allocate a zeroed buffer of `len` bytes. Never fails.
    pub fn allocate(&self, len: usize) -> Slice {
        if len > 0 && len >= self.min_slice() {
            if let Some(slice) = self.try_external(len, false) {
                return slice;
            }
        }
        Slice::managed(len)
    }

    /// Allocate from the external allocator regardless of the budget.
    ///
    /// The bytes are still counted. Fails only if the external allocator
    /// itself cannot satisfy the request.
    pub fn allocate_external(&self, len: usize) -> Result<Slice, AllocError> {
        if len == 0 {
            return Ok(Slice::managed(0));
        }
        self.try_external(len, true).ok_or(AllocError::External {
            allocator: self.shared.strategy.name(),
            len,
        })
    }

    fn try_external(&self, len: usize, force: bool) -> Option<Slice> {
        let shared = &self.shared;
        if !shared.reserve(len, force) {
            trace!(
                len,
                outstanding = self.outstanding(),
                max = self.max_bytes(),
                "External budget exhausted, using managed slice"
            );
            return None;
        }
        match shared.strategy.allocate(len) {
            Some(ptr) => Some(Slice::external(ptr, len, Arc::clone(shared))),
            None => {
                shared.uncount(len);
                debug!(
                    len,
                    allocator = shared.strategy.name(),
                    "External allocation failed"
                );
                None
            }
        }
    }

    /// External bytes currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Budget for non-forced external allocations.
    pub fn max_bytes(&self) -> usize {
        self.shared.max_bytes.load(Ordering::Acquire)
    }

    /// Change the budget. Existing slices are not affected.
    pub fn set_max_bytes(&self, max: usize) {
        self.shared.max_bytes.store(max, Ordering::Release);
    }

    /// Threshold below which allocation is always managed.
    pub fn min_slice(&self) -> usize {
        self.shared.min_slice.load(Ordering::Acquire)
    }

    pub fn set_min_slice(&self, min: usize) {
        self.shared.min_slice.store(min, Ordering::Release);
    }

    /// Name of the external strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.shared.strategy.name()
    }
}

impl Default for BufferAllocator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for BufferAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferAllocator")
            .field("strategy", &self.strategy_name())
            .field("outstanding", &self.outstanding())
            .field("max_bytes", &self.max_bytes())
            .field("min_slice", &self.min_slice())
            .finish()
    }
}

/// Builder for [`BufferAllocator`].
pub struct BufferAllocatorBuilder {
    strategy: Box<dyn ExternalAllocator>,
    max_bytes: usize,
    min_slice: usize,
}

impl Default for BufferAllocatorBuilder {
    fn default() -> Self {
        Self {
            strategy: Box::new(Malloc),
            max_bytes: 0,
            min_slice: MIN_OFFHEAP_SLICE,
        }
    }
}

impl BufferAllocatorBuilder {
    pub fn strategy(mut self, strategy: impl ExternalAllocator) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn boxed_strategy(mut self, strategy: Box<dyn ExternalAllocator>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = max;
        self
    }

    pub fn min_slice(mut self, min: usize) -> Self {
        self.min_slice = min;
        self
    }

    pub fn build(self) -> BufferAllocator {
        BufferAllocator {
            shared: Arc::new(Shared {
                outstanding: AtomicUsize::new(0),
                max_bytes: AtomicUsize::new(self.max_bytes),
                min_slice: AtomicUsize::new(self.min_slice),
                strategy: self.strategy,
            }),
        }
    }
}

static GLOBAL: OnceLock<BufferAllocator> = OnceLock::new();

/// Install the process allocator's external strategy.
///
/// Must happen before the first use of [`global`]; the strategy is fixed for
/// the rest of the process.
pub fn install_global(strategy: Box<dyn ExternalAllocator>) -> Result<(), AllocError> {
    let name = strategy.name();
    GLOBAL
        .set(BufferAllocator::builder().boxed_strategy(strategy).build())
        .map_err(|_| AllocError::AlreadyInstalled)?;
    debug!(allocator = name, "Installed global buffer allocator");
    Ok(())
}

/// The process allocator. Defaults to [`Malloc`] with a zero budget.
pub fn global() -> &'static BufferAllocator {
    GLOBAL.get_or_init(BufferAllocator::default)
}

/// Allocate from the process allocator.
pub fn make_slice(len: usize) -> Slice {
    global().allocate(len)
}

/// Forced external allocation from the process allocator.
pub fn make_offheap_slice(len: usize) -> Result<Slice, AllocError> {
    global().allocate_external(len)
}

/// Outstanding external bytes of the process allocator.
pub fn offheap_bytes() -> usize {
    global().outstanding()
}

pub fn max_offheap_bytes() -> usize {
    global().max_bytes()
}

pub fn set_max_offheap_bytes(max: usize) {
    global().set_max_bytes(max);
}

pub fn set_min_offheap_slice(min: usize) {
    global().set_min_slice(min);
}
