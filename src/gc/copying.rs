//! Semispace copying collector - bump allocation, breadth-first evacuation
//!
//! Allocation is a cursor increment in the active half. Collection copies
//! every reachable object into the idle half (Cheney scan: the gap between
//! the scan and copy cursors is the worklist, so tracing never recurses),
//! rewrites the registered roots, and swaps the halves. Dead objects are
//! reclaimed by never being copied.

use core::mem;
use core::ptr::{self, NonNull};

use tracing::{debug, trace};

use crate::heap::header::{for_each_edge, GcRef, ObjHeader, HEADER_SIZE, SLOT_SIZE};
use crate::heap::region::Region;

use super::{CollectStats, Collector, RootRegistry};

/// The two halves plus bump state for the active one.
pub struct Semispace {
    active: Region,
    idle: Region,
    cursor: *mut u8,
    end: *mut u8,
}

impl Semispace {
    #[inline]
    fn used(&self) -> usize {
        let (start, _) = self.active.bounds();
        self.cursor as usize - start as usize
    }

    /// Move one object into to-space, or chase its forwarding marker if it
    /// already went. Idempotent per object: shared sub-objects are copied
    /// exactly once and cycles terminate on the marker.
    unsafe fn evacuate(old: GcRef, from: &Region, free: &mut *mut u8) -> GcRef {
        if old.is_null() {
            return old;
        }
        let header = old.header_ptr();
        if !from.contains(header as *const u8) {
            // Already rewritten; a slot registered through two scopes lands
            // here on its second visit.
            return old;
        }
        if let Some(new) = (*header).forwarded() {
            return GcRef::from_header(new);
        }

        let total = HEADER_SIZE + (*header).size();
        let new = *free as *mut ObjHeader;
        ptr::copy_nonoverlapping(header as *const u8, new as *mut u8, total);
        // The relay word travels with the copied bytes; scrub it so the
        // new block never looks forwarded.
        (*new).clear_relay();
        *free = free.add(total);
        (*header).forward_to(new);
        GcRef::from_header(NonNull::new_unchecked(new))
    }
}

impl Collector for Semispace {
    const NAME: &'static str = "copying";

    fn with_budget(budget: usize) -> Self {
        let half = (budget / 2) & !(SLOT_SIZE - 1);
        assert!(
            half >= HEADER_SIZE + SLOT_SIZE,
            "heap budget too small for a semispace pair"
        );

        let active = Region::new(half).expect("semispace allocation failed");
        let idle = Region::new(half).expect("semispace allocation failed");
        let (cursor, end) = active.bounds();

        debug!(half_bytes = half, "semispace heap ready");
        Self {
            active,
            idle,
            cursor,
            end,
        }
    }

    #[inline]
    fn try_allocate(&mut self, payload: usize) -> Option<NonNull<ObjHeader>> {
        debug_assert!(payload % SLOT_SIZE == 0, "payload must be 8-aligned");

        let total = HEADER_SIZE + payload;
        let remaining = self.end as usize - self.cursor as usize;
        if total > remaining {
            return None;
        }

        let header = self.cursor as *mut ObjHeader;
        unsafe {
            self.cursor = self.cursor.add(total);
            ObjHeader::write_blank(header, payload);
        }
        NonNull::new(header)
    }

    fn collect(&mut self, roots: &RootRegistry) -> CollectStats {
        let used_before = self.used();
        let from = &self.active;
        let (to_start, to_end) = self.idle.bounds();
        let mut free = to_start;

        // Roots seed to-space; each registered slot is rewritten to the
        // survivor's new address.
        trace!(roots = roots.depth(), "evacuating roots");
        for slot in roots.iter() {
            unsafe {
                *slot = Self::evacuate(*slot, from, &mut free);
            }
        }

        // Cheney scan: everything between `scan` and `free` still has
        // un-forwarded children.
        let mut live_objects = 0;
        let mut scan = to_start;
        while scan < free {
            let obj = scan as *mut ObjHeader;
            unsafe {
                for_each_edge(obj, |edge| {
                    *edge = Self::evacuate(*edge, from, &mut free);
                });
                scan = scan.add(HEADER_SIZE + (*obj).size());
            }
            live_objects += 1;
        }
        debug_assert!(scan == free);
        debug_assert!(free <= to_end);

        let live_bytes = free as usize - to_start as usize;
        mem::swap(&mut self.active, &mut self.idle);
        self.cursor = free;
        self.end = to_end;

        trace!(
            live_objects,
            live_bytes,
            "flip complete, halves swapped"
        );

        CollectStats {
            live_objects,
            live_bytes,
            reclaimed_bytes: used_before - live_bytes,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.active.size() + self.idle.size()
    }

    #[inline]
    fn free_bytes(&self) -> usize {
        self.end as usize - self.cursor as usize
    }
}
