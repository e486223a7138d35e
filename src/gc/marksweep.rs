//! Mark-sweep collector - free-list allocation, in-place reclamation
//!
//! Allocation is a first-fit walk of the free list with block splitting.
//! Collection marks everything reachable from the roots through an explicit
//! worklist, then sweeps the whole object space linearly, rebuilding the
//! free list in address order and coalescing adjacent free blocks. Object
//! addresses never change; fragmentation can accumulate and no compaction
//! pass exists.

use core::ptr::{self, NonNull};
use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::heap::header::{for_each_edge, ObjHeader, Tag, HEADER_SIZE, SLOT_SIZE};
use crate::heap::region::Region;

use super::{CollectStats, Collector, RootRegistry};

/// Splitting leaves the remainder holding at least one slot.
const MIN_BLOCK: usize = HEADER_SIZE + SLOT_SIZE;

pub struct MarkSweep {
    space: Region,
    /// End of the tiled object space; blocks cover `[start, limit)` exactly.
    limit: *mut u8,
    /// Head of the free list, threaded through each free header's relay.
    free_head: *mut ObjHeader,
}

impl MarkSweep {
    /// Append `block` to the list ending at `tail`, keeping address order
    /// (the sweep walks the space front to back).
    unsafe fn append_free(
        head: &mut *mut ObjHeader,
        tail: &mut *mut ObjHeader,
        block: *mut ObjHeader,
    ) {
        if tail.is_null() {
            *head = block;
        } else {
            (**tail).set_next_free(block);
        }
        *tail = block;
    }
}

impl Collector for MarkSweep {
    const NAME: &'static str = "marksweep";

    fn with_budget(budget: usize) -> Self {
        assert!(
            budget >= MIN_BLOCK,
            "heap budget too small for a single object"
        );

        let space = Region::new(budget).expect("object space allocation failed");
        let (start, _) = space.bounds();
        let capacity = (budget - HEADER_SIZE) & !(SLOT_SIZE - 1);

        let first = start as *mut ObjHeader;
        unsafe {
            ObjHeader::make_free(first, capacity, ptr::null_mut());
        }

        debug!(capacity_bytes = capacity, "mark-sweep heap ready");
        Self {
            space,
            limit: unsafe { start.add(HEADER_SIZE + capacity) },
            free_head: first,
        }
    }

    fn try_allocate(&mut self, payload: usize) -> Option<NonNull<ObjHeader>> {
        debug_assert!(payload % SLOT_SIZE == 0, "payload must be 8-aligned");

        // First fit. A block too tight to split is handed out whole; its
        // header keeps the true capacity so the sweep walk stays exact.
        let mut prev: *mut ObjHeader = ptr::null_mut();
        let mut cur = self.free_head;
        while !cur.is_null() {
            unsafe {
                let cap = (*cur).size();
                let next = (*cur).next_free();
                if cap >= payload {
                    if cap - payload >= MIN_BLOCK {
                        let rest = ObjHeader::payload(cur).add(payload) as *mut ObjHeader;
                        ObjHeader::make_free(rest, cap - payload - HEADER_SIZE, next);
                        (*cur).set_size(payload);
                        if prev.is_null() {
                            self.free_head = rest;
                        } else {
                            (*prev).set_next_free(rest);
                        }
                    } else if prev.is_null() {
                        self.free_head = next;
                    } else {
                        (*prev).set_next_free(next);
                    }
                    return NonNull::new(cur);
                }
                prev = cur;
                cur = next;
            }
        }
        None
    }

    fn collect(&mut self, roots: &RootRegistry) -> CollectStats {
        // Mark: explicit worklist from the roots; an already-marked object
        // is never re-queued, which bounds the loop on cycles and shared
        // references alike.
        let mut worklist: VecDeque<*mut ObjHeader> = VecDeque::new();
        for slot in roots.iter() {
            let r = unsafe { *slot };
            if r.is_null() {
                continue;
            }
            let header = r.header_ptr();
            unsafe {
                debug_assert!(
                    self.space.contains(header as *const u8),
                    "root outside this heap's object space"
                );
                debug_assert!((*header).tag() != Tag::Free, "root points at a freed block");
                if !(*header).is_marked() {
                    (*header).set_mark();
                    worklist.push_back(header);
                }
            }
        }

        let mut live_objects = 0;
        let mut live_bytes = 0;
        while let Some(obj) = worklist.pop_front() {
            live_objects += 1;
            unsafe {
                live_bytes += HEADER_SIZE + (*obj).size();
                for_each_edge(obj, |edge| {
                    let child = *edge;
                    if child.is_null() {
                        return;
                    }
                    let header = child.header_ptr();
                    if !(*header).is_marked() {
                        (*header).set_mark();
                        worklist.push_back(header);
                    }
                });
            }
        }
        trace!(live_objects, live_bytes, "mark phase complete");

        // Sweep: linear walk of the whole space. Runs of dead and free
        // blocks coalesce into one block as they are rebuilt into the list.
        let (start, _) = self.space.bounds();
        let mut head: *mut ObjHeader = ptr::null_mut();
        let mut tail: *mut ObjHeader = ptr::null_mut();
        let mut run: *mut ObjHeader = ptr::null_mut();
        let mut run_bytes = 0usize;
        let mut reclaimed = 0usize;

        let mut p = start;
        while p < self.limit {
            let header = p as *mut ObjHeader;
            unsafe {
                let total = HEADER_SIZE + (*header).size();
                if (*header).is_marked() {
                    (*header).clear_mark();
                    if !run.is_null() {
                        ObjHeader::make_free(run, run_bytes - HEADER_SIZE, ptr::null_mut());
                        Self::append_free(&mut head, &mut tail, run);
                        run = ptr::null_mut();
                    }
                } else {
                    if (*header).tag() != Tag::Free {
                        reclaimed += total;
                    }
                    if run.is_null() {
                        run = header;
                        run_bytes = total;
                    } else {
                        run_bytes += total;
                    }
                }
                p = p.add(total);
            }
        }
        if !run.is_null() {
            unsafe {
                ObjHeader::make_free(run, run_bytes - HEADER_SIZE, ptr::null_mut());
                Self::append_free(&mut head, &mut tail, run);
            }
        }
        self.free_head = head;

        trace!(reclaimed_bytes = reclaimed, "sweep phase complete");

        CollectStats {
            live_objects,
            live_bytes,
            reclaimed_bytes: reclaimed,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.space.size()
    }

    fn free_bytes(&self) -> usize {
        let mut total = 0;
        let mut cur = self.free_head;
        while !cur.is_null() {
            unsafe {
                total += HEADER_SIZE + (*cur).size();
                cur = (*cur).next_free();
            }
        }
        total
    }
}
