//! Runtime type nodes
//!
//! A [`TypeNode`] is the runtime representation of one registered kind or
//! class: its unique name, kind, nullable parent (Object kind only), value
//! size, and operation table. Type nodes are themselves managed objects of
//! the bootstrap type, so they live in the universe like everything else and
//! stay alive through GC locks rather than tracing.

use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::gc::Collector;
use crate::object::ObjectRef;
use crate::stack::ValueStack;
use crate::ArmsResult;

/// Kind of a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// No payload
    Void,
    /// Boolean payload
    Boolean,
    /// Signed integer payload
    Integer,
    /// Unsigned integer payload
    Natural,
    /// Floating-point payload
    Real,
    /// Machine-sized payload
    Size,
    /// Opaque host payload
    ForeignValue,
    /// Class instance with optional parent and dispatch tables
    Object,
}

/// Constructor operation: initialize the payload of a freshly allocated
/// object from an argument frame on the operand stack.
pub type ConstructFn =
    fn(&mut Collector, TypeRef, ObjectRef, &mut ValueStack) -> ArmsResult<()>;

/// Destructor operation: release one inheritance level's resources.
pub type DestructFn = fn(&mut Collector, TypeRef, ObjectRef);

/// Visit operation: forward one inheritance level's owned references to
/// [`Collector::visit`].
pub type VisitFn = fn(&mut Collector, TypeRef, ObjectRef);

/// Callback fired when a type is unregistered at shutdown.
pub type TypeRemovedFn = fn(&mut Collector, TypeRef);

/// Per-type operation table
///
/// Dynamic dispatch runs through these function pointers; a level without an
/// entry is simply skipped by the chain walks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeOperations {
    /// Constructor, invoked through the operand-stack protocol
    pub construct: Option<ConstructFn>,
    /// Destructor, invoked at finalization
    pub destruct: Option<DestructFn>,
    /// Reference visitor, invoked during marking
    pub visit: Option<VisitFn>,
}

impl TypeOperations {
    /// An empty operation table (reachability leaf).
    pub const fn none() -> Self {
        Self {
            construct: None,
            destruct: None,
            visit: None,
        }
    }
}

/// Runtime type node
pub struct TypeNode {
    name: Box<str>,
    kind: TypeKind,
    parent: Option<TypeRef>,
    value_size: usize,
    operations: TypeOperations,
    type_removed: Option<TypeRemovedFn>,
}

impl TypeNode {
    pub(crate) fn new(
        name: &str,
        kind: TypeKind,
        parent: Option<TypeRef>,
        value_size: usize,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            parent,
            value_size,
            operations,
            type_removed,
        }
    }

    /// Unique dotted name of this type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of this type.
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Parent type, present only on Object-kind types.
    pub fn parent(&self) -> Option<TypeRef> {
        self.parent
    }

    /// Payload size in bytes of an instance of this type.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Operation table of this type.
    pub fn operations(&self) -> &TypeOperations {
        &self.operations
    }

    pub(crate) fn type_removed(&self) -> Option<TypeRemovedFn> {
        self.type_removed
    }

    /// Whether instances of this type need scanning during marking.
    ///
    /// Object kinds scan when any level of the inheritance chain carries a
    /// visit operation; other kinds consult only their own table. Types
    /// without any visit are reachability leaves: the collector blackens
    /// their instances directly instead of routing them through the gray
    /// worklist.
    pub fn scan_required(&self) -> bool {
        match self.kind {
            TypeKind::Object => {
                if self.operations.visit.is_some() {
                    return true;
                }
                let mut current = self.parent;
                while let Some(node) = current {
                    if node.operations().visit.is_some() {
                        return true;
                    }
                    current = node.parent();
                }
                false
            }
            _ => self.operations.visit.is_some(),
        }
    }
}

impl fmt::Debug for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parent", &self.parent.map(|p| p.name().to_owned()))
            .field("value_size", &self.value_size)
            .finish()
    }
}

/// Reference to a registered type
///
/// A `TypeRef` is a copyable pointer to the managed `TypeNode` payload; its
/// tag sits immediately before the node in memory like any other managed
/// object.
///
/// # Safety
///
/// Dereferencing is safe only while the node is alive. Registered types are
/// pinned by their registration lock until the registry is torn down, so in
/// practice a `TypeRef` obtained from a register call stays valid for the
/// life of the collector.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef {
    ptr: NonNull<TypeNode>,
}

impl TypeRef {
    /// Wrap a pointer to a managed `TypeNode` payload.
    ///
    /// # Safety
    ///
    /// The pointer must address a live `TypeNode` allocated by the
    /// collector, with its tag immediately preceding it.
    pub unsafe fn new(ptr: NonNull<TypeNode>) -> Self {
        Self { ptr }
    }

    /// View this type node as a plain managed object.
    pub fn as_object(&self) -> ObjectRef {
        unsafe { ObjectRef::new(self.ptr.cast()) }
    }

    /// Address identity of the node.
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Subtype test.
    ///
    /// Object kinds walk the parent chain comparing node identity; every
    /// other kind is a subtype only of itself. O(chain depth), no hashing.
    pub fn is_sub_type(&self, other: TypeRef) -> bool {
        if self.kind() != TypeKind::Object || other.kind() != TypeKind::Object {
            return *self == other;
        }

        let mut current = Some(*self);
        while let Some(node) = current {
            if node == other {
                return true;
            }
            current = node.parent();
        }
        false
    }
}

impl Deref for TypeRef {
    type Target = TypeNode;

    #[inline]
    fn deref(&self) -> &TypeNode {
        unsafe { self.ptr.as_ref() }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({} @ {:#x})", self.name(), self.addr())
    }
}
