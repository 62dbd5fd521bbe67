//! Garbage collection system
//!
//! Tri-color mark-sweep over a tagged-object universe, with
//! reference-counted locks as the only roots.
//!
//! # Architecture
//!
//! - **Tag**: GC header prepended to every managed allocation (color, type,
//!   payload size)
//! - **LockTable**: reference-counted root pins, the collector's only roots
//! - **NotifyDestroy**: callbacks fired once when an object is finalized
//! - **Collector**: lifecycle, type registry, universe, gray worklist, and
//!   the premark/mark/sweep cycle
//!
//! # Memory Layout
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Tag (24 bytes, 8-byte aligned)          │
//! │  - color: White | Gray | Black          │
//! │  - ty: owning TypeRef                   │
//! │  - size: payload bytes                  │
//! ├─────────────────────────────────────────┤  ← ObjectRef points here
//! │ Payload (size bytes, zero-filled)       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Collection cycle
//!
//! [`Collector::run`] executes three ordered phases, never interleaved with
//! allocation: premark grays every pinned object, mark drains the gray
//! worklist through per-type visit operations, and sweep finalizes whatever
//! stayed white while recoloring survivors for the next cycle.

mod collector;
mod lock;
mod notify;
pub(crate) mod tag;

pub use collector::{
    AllocatorKind, Collector, CollectorOptions, CollectorStats, CycleReport,
};
pub use notify::NotifyId;
pub use tag::{Color, Tag};
