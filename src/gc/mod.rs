//! Collector back ends - two implementations of one allocator interface
//!
//! The back end is chosen at build time: generic code is written against
//! [`Collector`], and the `copying`/`marksweep` cargo features pick which
//! one `DefaultHeap` aliases. Both compile and test unconditionally.

mod copying;
mod marksweep;
mod roots;

#[cfg(test)]
mod tests;

pub use copying::Semispace;
pub use marksweep::MarkSweep;
pub use roots::{RootRegistry, RootScope, RootSlot};

use core::ptr::NonNull;

use crate::heap::header::ObjHeader;

/// One allocator interface over the interchangeable back ends.
///
/// Contract shared by implementations:
/// - `try_allocate` takes an 8-aligned payload size and hands back a block
///   whose header `size` is set to the block's true capacity (>= request);
///   tag, mask and flags are the caller's to stamp.
/// - `collect` runs a full stop-the-world cycle from the registered roots,
///   synchronously, to completion. Nothing reachable from the registry at
///   entry is reclaimed or left pointing at stale storage.
pub trait Collector {
    /// Short name for logs.
    const NAME: &'static str;

    /// Build a collector owning `budget` bytes of object space.
    fn with_budget(budget: usize) -> Self;

    /// Carve a block with at least `payload` bytes behind the header, or
    /// `None` when the space is exhausted and a collection is due.
    fn try_allocate(&mut self, payload: usize) -> Option<NonNull<ObjHeader>>;

    /// Trace from `roots`, reclaim everything unreachable.
    fn collect(&mut self, roots: &RootRegistry) -> CollectStats;

    /// Total bytes of object space this collector owns.
    fn capacity(&self) -> usize;

    /// Bytes still handed out without collecting (headers included).
    fn free_bytes(&self) -> usize;
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectStats {
    /// Objects that survived.
    pub live_objects: usize,
    /// Bytes occupied by survivors, headers included.
    pub live_bytes: usize,
    /// Bytes returned to allocatable space this cycle.
    pub reclaimed_bytes: usize,
}
