//! Loam heap - memory management core for the Loam runtime
//!
//! This crate provides the heap layer statically linked into compiled Loam
//! programs: object header encoding, the allocation entry points, explicit
//! root tracking, and two interchangeable collector back ends (semispace
//! copying and mark-sweep), chosen at build time.
//!
//! The value-type library (strings, sequences, maps) and the OS shims live
//! in sibling crates and consume this surface. Their obligations: give
//! every heap shape a field mask covering exactly its reference slots, and
//! wrap every local binding that must outlive an allocating call in a
//! [`RootScope`].

pub mod gc;
pub mod heap;
pub mod logging;

// Re-export core types
pub use gc::{CollectStats, Collector, MarkSweep, RootScope, RootSlot, Semispace};
pub use heap::{
    CopyingHeap, DefaultHeap, Gc, GcRef, Heap, HeapConfig, HeapStats, HeapValue, MarkSweepHeap,
    Shape,
};
