//! Heap core - the allocation entry point and its context object
//!
//! Design: one explicitly constructed `Heap` per mutator, no process-wide
//! state. The heap owns a collector back end behind interior mutability so
//! an open [`RootScope`](crate::gc::RootScope) never blocks allocation;
//! exactly one mutator thread is assumed and the type is `!Sync`.

pub mod header;
pub(crate) mod region;


pub use header::{Gc, GcRef, HeapValue, Shape, HEADER_SIZE, MAX_FIXED_SLOTS, SLOT_SIZE};

use core::cell::{Cell, RefCell};
use core::mem;
use std::time::Instant;

use tracing::debug;

use crate::gc::{CollectStats, Collector, MarkSweep, RootRegistry, RootSlot, Semispace};
use crate::logging::{log_allocation, log_gc_complete, log_gc_start};

use header::ObjHeader;

/// Default object-space budget when none is configured: 1 MiB.
pub const DEFAULT_BUDGET: usize = 1024 * 1024;

/// Heap construction parameters.
///
/// `from_env` reads `LOAM_HEAP_BYTES`; anything unset or unparsable falls
/// back to the default.
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Total object-space budget in bytes. Must be non-zero; there is no
    /// growth strategy once the heap exists.
    pub budget: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
        }
    }
}

impl HeapConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bytes) = std::env::var("LOAM_HEAP_BYTES") {
            if let Ok(bytes) = bytes.parse::<usize>() {
                config.budget = bytes;
            }
        }

        config
    }
}

/// Counters for monitoring and tests.
#[derive(Debug, Clone, Copy)]
pub struct HeapStats {
    /// Total bytes of object space owned.
    pub capacity: usize,
    /// Bytes still allocatable without a collection, headers included.
    pub free_bytes: usize,
    /// Collection cycles run so far.
    pub collections: usize,
    /// Bytes reclaimed across all cycles.
    pub reclaimed_bytes: usize,
}

/// A complete heap: object space, collector back end, root registry.
///
/// Objects are created solely through the allocation entry points and
/// persist until unreachable from the registry at a collection boundary.
/// Nothing is ever freed individually and no finalizer ever runs.
pub struct Heap<C: Collector> {
    gc: RefCell<C>,
    roots: RefCell<RootRegistry>,
    collections: Cell<usize>,
    reclaimed: Cell<usize>,
}

impl<C: Collector> Heap<C> {
    /// Build a heap owning `budget` bytes of object space.
    ///
    /// A zero budget is a programming error and fails fatally; there is no
    /// recovery path and no later resizing.
    pub fn with_budget(budget: usize) -> Self {
        assert!(budget > 0, "heap budget must be non-zero");
        Self {
            gc: RefCell::new(C::with_budget(budget)),
            roots: RefCell::new(RootRegistry::new()),
            collections: Cell::new(0),
            reclaimed: Cell::new(0),
        }
    }

    pub fn with_config(config: &HeapConfig) -> Self {
        Self::with_budget(config.budget)
    }

    /// The raw allocation entry point: zeroed, header-aligned storage of at
    /// least `bytes` payload bytes, stamped with `shape`.
    ///
    /// On exhaustion a full collection runs first; if the request still
    /// does not fit, the heap fails fatally. Every existing reference that
    /// must survive this call has to be registered through an active root
    /// scope before it.
    pub fn allocate(&self, bytes: usize, shape: Shape) -> GcRef {
        let payload = align_slot(bytes);
        if let Shape::Fixed { mask } = shape {
            let slots = payload / SLOT_SIZE;
            debug_assert!(slots <= MAX_FIXED_SLOTS, "fixed payload wider than the mask");
            debug_assert!(
                slots == MAX_FIXED_SLOTS || mask >> slots == 0,
                "field mask covers slots beyond the payload"
            );
        }

        let mut gc = self.gc.borrow_mut();
        let header = match gc.try_allocate(payload) {
            Some(header) => header,
            None => {
                debug!(
                    requested = bytes,
                    collector = C::NAME,
                    "space exhausted, collecting"
                );
                self.run_collection(&mut gc);
                gc.try_allocate(payload).unwrap_or_else(|| {
                    panic!(
                        "heap exhausted: {} byte allocation does not fit after a full collection",
                        bytes
                    )
                })
            }
        };

        unsafe {
            let header = header.as_ptr();
            (*header).retag(shape);
            core::ptr::write_bytes(ObjHeader::payload(header), 0, (*header).size());
            log_allocation((*header).size(), header as *const u8);
            GcRef::from_header(core::ptr::NonNull::new_unchecked(header))
        }
    }

    /// The generic allocator: move a typed value onto the heap.
    ///
    /// May trigger a full collection before `value` lands, so references
    /// held in the arguments that built `value` get no implicit
    /// protection; root them first.
    pub fn alloc<T: HeapValue>(&self, value: T) -> Gc<T> {
        debug_assert!(
            mem::align_of::<T>() <= SLOT_SIZE,
            "heap values are at most 8-byte aligned"
        );
        let raw = self.allocate(mem::size_of::<T>(), T::SHAPE);
        unsafe {
            core::ptr::write(raw.payload() as *mut T, value);
        }
        Gc::from_raw(raw)
    }

    /// Variable-length all-reference payload of `len` slots, all null.
    pub fn alloc_ref_array(&self, len: usize) -> GcRef {
        self.allocate(len * SLOT_SIZE, Shape::RefArray)
    }

    /// Untraced byte payload.
    pub fn alloc_opaque(&self, bytes: usize) -> GcRef {
        self.allocate(bytes, Shape::Opaque)
    }

    /// Register a caller-owned slot as a root. Prefer
    /// [`RootScope`](crate::gc::RootScope); push and pop must stay strictly
    /// LIFO or later root rewriting corrupts silently.
    #[inline]
    pub fn push_root(&self, slot: RootSlot) {
        self.roots.borrow_mut().push(slot.0);
    }

    /// Drop the most recently pushed root.
    #[inline]
    pub fn pop_root(&self) {
        self.roots.borrow_mut().pop();
    }

    /// Current registry depth.
    #[inline]
    pub fn root_depth(&self) -> usize {
        self.roots.borrow().depth()
    }

    /// Run a collection now, regardless of pressure.
    pub fn force_collect(&self) -> CollectStats {
        let mut gc = self.gc.borrow_mut();
        self.run_collection(&mut gc)
    }

    pub fn stats(&self) -> HeapStats {
        let gc = self.gc.borrow();
        HeapStats {
            capacity: gc.capacity(),
            free_bytes: gc.free_bytes(),
            collections: self.collections.get(),
            reclaimed_bytes: self.reclaimed.get(),
        }
    }

    /// Stop-the-world cycle: runs synchronously inside the call that
    /// discovered exhaustion and always to completion.
    fn run_collection(&self, gc: &mut C) -> CollectStats {
        let roots = self.roots.borrow();
        log_gc_start(C::NAME, roots.depth());

        let started = Instant::now();
        let stats = gc.collect(&roots);
        drop(roots);

        self.collections.set(self.collections.get() + 1);
        self.reclaimed.set(self.reclaimed.get() + stats.reclaimed_bytes);
        log_gc_complete(
            started.elapsed().as_micros() as u64,
            stats.reclaimed_bytes,
            stats.live_objects,
        );
        stats
    }
}

impl<C: Collector> Default for Heap<C> {
    fn default() -> Self {
        Self::with_config(&HeapConfig::default())
    }
}

/// Heap with the semispace copying back end.
pub type CopyingHeap = Heap<Semispace>;

/// Heap with the mark-sweep back end.
pub type MarkSweepHeap = Heap<MarkSweep>;

/// The back end the build selected. `copying` wins when both features are
/// enabled, matching the default feature set.
#[cfg(any(feature = "copying", not(feature = "marksweep")))]
pub type DefaultHeap = CopyingHeap;

#[cfg(all(feature = "marksweep", not(feature = "copying")))]
pub type DefaultHeap = MarkSweepHeap;

/// Round a payload request up to whole slots.
#[inline]
const fn align_slot(bytes: usize) -> usize {
    (bytes + SLOT_SIZE - 1) & !(SLOT_SIZE - 1)
}
