//! Root tracking - the collector's only window into the mutator's locals
//!
//! Roots are registered explicitly: a slot is the address of a local
//! binding holding a [`GcRef`], pushed for exactly the span of the calls
//! that may collect. The registry is a strict LIFO stack; scopes must close
//! in reverse open order or the registry is corrupted. That discipline is a
//! contract, not a checked condition.

use crate::heap::header::{Gc, GcRef, HeapValue};
use crate::heap::Heap;

use super::Collector;

/// Address of a caller-owned reference slot. The collector reads the slot
/// to find a root and may rewrite it when the object moves.
#[derive(Debug, Clone, Copy)]
pub struct RootSlot(pub(crate) *mut GcRef);

impl GcRef {
    /// Slot handle for registering this binding as a root.
    #[inline]
    pub fn slot(&mut self) -> RootSlot {
        RootSlot(self as *mut GcRef)
    }
}

impl<T: HeapValue> Gc<T> {
    /// Slot handle for registering this binding as a root.
    #[inline]
    pub fn slot(&mut self) -> RootSlot {
        // repr(transparent): a typed handle is one GcRef wide.
        RootSlot(self as *mut Gc<T> as *mut GcRef)
    }
}

/// Ordered stack of registered root slots. Push-only and pop-only at the
/// tail.
pub struct RootRegistry {
    slots: Vec<*mut GcRef>,
}

impl RootRegistry {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    #[inline]
    pub(crate) fn push(&mut self, slot: *mut GcRef) {
        self.slots.push(slot);
    }

    #[inline]
    pub(crate) fn pop(&mut self) {
        debug_assert!(!self.slots.is_empty(), "root registry underflow");
        self.slots.pop();
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = *mut GcRef> + '_ {
        self.slots.iter().copied()
    }
}

/// Scoped root registration with guaranteed release.
///
/// Pushes every given slot on construction and pops the same count on drop,
/// whichever way the scope exits, restoring the registry depth exactly.
///
/// ```
/// use loam_heap::{CopyingHeap, GcRef, RootScope, Shape};
///
/// let heap = CopyingHeap::with_budget(4096);
/// let mut held = heap.alloc_opaque(24);
/// let _roots = RootScope::new(&heap, [held.slot()]);
/// // `held` now survives any allocation below, and is rewritten in
/// // place if a collection moves it.
/// let _scratch: GcRef = heap.allocate(64, Shape::Opaque);
/// ```
pub struct RootScope<'h, C: Collector> {
    heap: &'h Heap<C>,
    count: usize,
}

impl<'h, C: Collector> RootScope<'h, C> {
    pub fn new(heap: &'h Heap<C>, slots: impl IntoIterator<Item = RootSlot>) -> Self {
        let mut count = 0;
        for slot in slots {
            heap.push_root(slot);
            count += 1;
        }
        Self { heap, count }
    }

    /// Number of slots this scope holds registered.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<C: Collector> Drop for RootScope<'_, C> {
    fn drop(&mut self) {
        for _ in 0..self.count {
            self.heap.pop_root();
        }
    }
}
