//! ARMS Runtime Core
//!
//! This crate provides the managed-runtime core:
//! - Tri-color mark-sweep garbage collector with reference-counted roots
//! - Type system with single inheritance and per-type dispatch tables
//! - Tagged `Value` union and the operand-stack construction protocol
//! - Finalization notification side table
//!
//! Memory comes from the allocator-agnostic managers in `arms-alloc`; the
//! collector works identically over the host heap and the slab arena.
//!
//! Everything here is single-threaded by contract: the collector, registry,
//! and universe are mutable state with no internal synchronization, and an
//! embedding host must serialize all calls itself. Collection is synchronous,
//! stop-the-world, and only ever runs when [`Collector::run`] is invoked.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod defaults;
pub mod gc;
pub mod object;
pub mod stack;
pub mod types;
pub mod value;

pub use gc::{
    AllocatorKind, Collector, CollectorOptions, CollectorStats, Color, CycleReport, NotifyId,
};
pub use object::ObjectRef;
pub use stack::ValueStack;
pub use types::{
    ConstructFn, DestructFn, TypeKind, TypeNode, TypeOperations, TypeRef, TypeRemovedFn, VisitFn,
    BOOTSTRAP_TYPE_NAME,
};
pub use value::{Atom, ForeignFunction, Value};

/// Runtime errors
///
/// Every fallible operation in the collector and the type/object layer
/// returns one of these status values. Deeply nested constructor chains
/// propagate them outward with `?`; there is no non-local control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArmsError {
    /// The memory manager could not satisfy a request
    #[error("allocation failed")]
    AllocationFailed,

    /// An argument value violated a precondition
    #[error("invalid argument value")]
    ArgumentValueInvalid,

    /// An argument had the wrong type
    #[error("invalid argument type")]
    ArgumentTypeInvalid,

    /// A constructor was invoked with the wrong number of arguments
    #[error("invalid number of arguments")]
    NumberOfArgumentsInvalid,

    /// A type with this name is already registered
    #[error("type already exists")]
    TypeExists,

    /// No type with this name is registered
    #[error("type does not exist")]
    TypeNotExists,

    /// The operation is invalid in the current state (double unlock,
    /// use before startup, operand stack misuse)
    #[error("operation invalid")]
    OperationInvalid,
}

/// Runtime result
pub type ArmsResult<T> = Result<T, ArmsError>;

impl From<arms_alloc::AllocError> for ArmsError {
    fn from(err: arms_alloc::AllocError) -> Self {
        match err {
            arms_alloc::AllocError::ArgumentValueInvalid => ArmsError::ArgumentValueInvalid,
            arms_alloc::AllocError::AllocationFailed => ArmsError::AllocationFailed,
        }
    }
}
