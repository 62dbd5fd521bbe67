//! Runtime type system
//!
//! Registered types form a single-inheritance graph of managed
//! [`TypeNode`]s, each carrying a per-type operation table for construct,
//! destruct, and visit dispatch. The registry lives on the collector; type
//! nodes stay alive through GC locks (registration pins plus parent pins),
//! never through tracing.

mod node;
mod registry;

pub use node::{
    ConstructFn, DestructFn, TypeKind, TypeNode, TypeOperations, TypeRef, TypeRemovedFn, VisitFn,
};
pub use registry::BOOTSTRAP_TYPE_NAME;
