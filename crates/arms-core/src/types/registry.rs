//! Type registration
//!
//! Every registered type is a managed [`TypeNode`] allocated through the
//! collector itself, under a bootstrap type that is registered first and
//! describes type nodes — including its own node. Registration pins the new
//! node with a GC lock and pins the bootstrap node (so it outlives every
//! node whose tag points at it); registering an Object-kind type
//! additionally locks its parent, which keeps the whole ancestor chain alive
//! while any descendant exists. All of these pins release when the child
//! node is finalized.
//!
//! The registry is a prepend-order list: lookup walks newest-first, and the
//! shutdown teardown unregisters in the same order, so children always leave
//! before the parents they pin.

use std::ptr::NonNull;

use crate::gc::Collector;
use crate::object::ObjectRef;
use crate::types::node::{TypeKind, TypeNode, TypeOperations, TypeRef, TypeRemovedFn};
use crate::{ArmsError, ArmsResult};

/// Name of the bootstrap type describing type nodes.
pub const BOOTSTRAP_TYPE_NAME: &str = "arms.Type";

/// Destructor of the bootstrap type: releases the node's parent and
/// bootstrap pins, then drops the node payload in place.
fn type_destruct(collector: &mut Collector, ty: TypeRef, object: ObjectRef) {
    let node = object.as_ptr().cast::<TypeNode>();
    unsafe {
        if let Some(parent) = (*node).parent() {
            let released = collector.unlock(parent.as_object());
            debug_assert!(released.is_ok(), "parent pin already released");
        }
    }

    // Every registration pins the bootstrap node so it outlives the nodes
    // whose tags point at it. The bootstrap node itself never self-pinned.
    if ty.as_object() != object {
        let released = collector.unlock(ty.as_object());
        debug_assert!(released.is_ok(), "bootstrap pin already released");
    }

    unsafe { std::ptr::drop_in_place(node) };
}

impl Collector {
    /// Look up a registered type by name, newest registration first.
    ///
    /// # Errors
    ///
    /// `TypeNotExists` when no type carries this name.
    pub fn find_type(&self, name: &str) -> ArmsResult<TypeRef> {
        self.registry
            .iter()
            .rev()
            .find(|node| node.name() == name)
            .copied()
            .ok_or(ArmsError::TypeNotExists)
    }

    /// Register a Void-kind type (no payload).
    pub fn register_void_type(
        &mut self,
        name: &str,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> ArmsResult<TypeRef> {
        self.add_type(name, TypeKind::Void, None, 0, operations, type_removed)
    }

    /// Register a Boolean-kind type.
    pub fn register_boolean_type(
        &mut self,
        name: &str,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> ArmsResult<TypeRef> {
        self.add_type(
            name,
            TypeKind::Boolean,
            None,
            std::mem::size_of::<bool>(),
            operations,
            type_removed,
        )
    }

    /// Register an Integer-kind type.
    pub fn register_integer_type(
        &mut self,
        name: &str,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> ArmsResult<TypeRef> {
        self.add_type(
            name,
            TypeKind::Integer,
            None,
            std::mem::size_of::<i64>(),
            operations,
            type_removed,
        )
    }

    /// Register a Natural-kind type.
    pub fn register_natural_type(
        &mut self,
        name: &str,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> ArmsResult<TypeRef> {
        self.add_type(
            name,
            TypeKind::Natural,
            None,
            std::mem::size_of::<u64>(),
            operations,
            type_removed,
        )
    }

    /// Register a Real-kind type.
    pub fn register_real_type(
        &mut self,
        name: &str,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> ArmsResult<TypeRef> {
        self.add_type(
            name,
            TypeKind::Real,
            None,
            std::mem::size_of::<f64>(),
            operations,
            type_removed,
        )
    }

    /// Register a Size-kind type.
    pub fn register_size_type(
        &mut self,
        name: &str,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> ArmsResult<TypeRef> {
        self.add_type(
            name,
            TypeKind::Size,
            None,
            std::mem::size_of::<usize>(),
            operations,
            type_removed,
        )
    }

    /// Register a ForeignValue-kind type with an opaque payload of
    /// `value_size` bytes.
    pub fn register_foreign_value_type(
        &mut self,
        name: &str,
        value_size: usize,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> ArmsResult<TypeRef> {
        self.add_type(
            name,
            TypeKind::ForeignValue,
            None,
            value_size,
            operations,
            type_removed,
        )
    }

    /// Register an Object-kind type.
    ///
    /// `value_size` covers the whole instance payload, every inheritance
    /// level included — all levels share one allocation. The parent, when
    /// present, must itself be an Object-kind type; it is pinned until this
    /// type's node is finalized.
    pub fn register_object_type(
        &mut self,
        name: &str,
        value_size: usize,
        parent: Option<TypeRef>,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> ArmsResult<TypeRef> {
        self.add_type(
            name,
            TypeKind::Object,
            parent,
            value_size,
            operations,
            type_removed,
        )
    }

    fn add_type(
        &mut self,
        name: &str,
        kind: TypeKind,
        parent: Option<TypeRef>,
        value_size: usize,
        operations: TypeOperations,
        type_removed: Option<TypeRemovedFn>,
    ) -> ArmsResult<TypeRef> {
        if !self.is_started() {
            return Err(ArmsError::OperationInvalid);
        }
        // Duplicate check happens before any allocation commits.
        if self.find_type(name).is_ok() {
            return Err(ArmsError::TypeExists);
        }
        if let Some(parent) = parent {
            if kind != TypeKind::Object || parent.kind() != TypeKind::Object {
                return Err(ArmsError::ArgumentTypeInvalid);
            }
        }

        let bootstrap = self.bootstrap.ok_or(ArmsError::OperationInvalid)?;
        let object = self.allocate_object(bootstrap)?;
        let node_ptr = object.as_ptr().cast::<TypeNode>();
        unsafe {
            node_ptr.write(TypeNode::new(
                name,
                kind,
                parent,
                value_size,
                operations,
                type_removed,
            ));
        }
        let node = unsafe { TypeRef::new(NonNull::new_unchecked(node_ptr)) };

        self.lock(object);
        self.lock(bootstrap.as_object());
        if let Some(parent) = parent {
            self.lock(parent.as_object());
        }
        self.registry.push(node);
        log::trace!("registered type {} ({:?})", name, kind);
        Ok(node)
    }

    /// Register the bootstrap type at first startup.
    ///
    /// The node is allocated before any type exists, so its tag starts
    /// without a type and is stamped with the node itself once written.
    pub(crate) fn register_bootstrap_type(&mut self) -> ArmsResult<()> {
        let object = self.allocate_raw(None, std::mem::size_of::<TypeNode>())?;
        let node_ptr = object.as_ptr().cast::<TypeNode>();
        unsafe {
            node_ptr.write(TypeNode::new(
                BOOTSTRAP_TYPE_NAME,
                TypeKind::ForeignValue,
                None,
                std::mem::size_of::<TypeNode>(),
                TypeOperations {
                    construct: None,
                    destruct: Some(type_destruct),
                    visit: None,
                },
                None,
            ));
        }
        let node = unsafe { TypeRef::new(NonNull::new_unchecked(node_ptr)) };

        self.set_type(object, node);
        self.lock(object);
        self.registry.push(node);
        self.bootstrap = Some(node);
        Ok(())
    }

    /// Whether `object` is the node of a registered type.
    pub(crate) fn registry_owns(&self, object: ObjectRef) -> bool {
        self.registry.iter().any(|node| node.as_object() == object)
    }

    /// Drain the registry newest-first, firing removal callbacks and
    /// releasing registration pins. The nodes themselves are reclaimed by
    /// the collection cycles that follow.
    pub(crate) fn unregister_all_types(&mut self) {
        while let Some(node) = self.registry.pop() {
            if let Some(type_removed) = node.type_removed() {
                type_removed(self, node);
            }
            let released = self.unlock(node.as_object());
            debug_assert!(released.is_ok(), "registration pin already released");
            log::trace!("unregistered type {}", node.name());
        }
        self.bootstrap = None;
    }
}
