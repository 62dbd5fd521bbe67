//! Managed object references and the construction protocol
//!
//! An [`ObjectRef`] points at the payload of a managed allocation; the
//! collector's tag sits immediately before it in memory. All inheritance
//! levels of an object share that one allocation — there is no per-level
//! sub-object, only per-level regions of the payload that each constructor
//! initializes.
//!
//! # Construction protocol
//!
//! Callers push an argument frame ([`ValueStack::push_arguments`]) and invoke
//! the most-derived type's construct operation through
//! [`Collector::construct_object`]. A construct operation is expected to:
//!
//! 1. push its fixed super-constructor arguments and call
//!    [`Collector::construct_super`] — base state always initializes before
//!    derived state,
//! 2. pop its own argument count (failing `NumberOfArgumentsInvalid` on an
//!    arity mismatch) and arguments (failing `ArgumentTypeInvalid` on a tag
//!    mismatch),
//! 3. initialize its own payload region,
//! 4. stamp the object's dynamic type with itself via
//!    [`Collector::set_type`], overwriting what the base constructor left.
//!
//! Teardown is the inverse: the generic finalize walk starts at the dynamic
//! type and invokes each level's destruct exactly once, most-derived first.

use std::fmt;
use std::ptr::NonNull;

use crate::gc::tag::Tag;
use crate::gc::Collector;
use crate::stack::ValueStack;
use crate::types::{TypeKind, TypeRef};
use crate::{ArmsError, ArmsResult};

/// Reference to a managed object
///
/// Copyable address identity; holding an `ObjectRef` does not root the
/// object. Anything that must survive a collection has to be locked, since
/// locks are the only GC roots — there is no stack scanning.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    ptr: NonNull<u8>,
}

impl ObjectRef {
    /// Wrap a payload pointer of a managed allocation.
    ///
    /// # Safety
    ///
    /// The pointer must point just past a collector [`Tag`].
    pub unsafe fn new(ptr: NonNull<u8>) -> Self {
        Self { ptr }
    }

    /// Raw payload pointer.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Payload address (for hashing and identity).
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Recover the tag preceding the payload.
    ///
    /// # Safety
    ///
    /// The object must still be live; after a sweep freed it the tag memory
    /// is gone.
    #[inline]
    pub(crate) unsafe fn tag_ptr(&self) -> *mut Tag {
        self.ptr.as_ptr().cast::<Tag>().sub(1)
    }

    /// Payload reference for a tag pointer.
    ///
    /// # Safety
    ///
    /// The tag must head a live managed allocation.
    #[inline]
    pub(crate) unsafe fn from_tag(tag: *mut Tag) -> Self {
        Self {
            ptr: NonNull::new_unchecked(tag.add(1).cast::<u8>()),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.addr())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object@{:#x}]", self.addr())
    }
}

/// Invoke the visit chain for an object during marking.
///
/// Object kinds walk from the dynamic type up through the ancestors,
/// invoking each level's visit exactly once; other kinds invoke the single
/// node's visit.
pub(crate) fn visit_object(collector: &mut Collector, ty: TypeRef, object: ObjectRef) {
    match ty.kind() {
        TypeKind::Object => {
            let mut current = Some(ty);
            while let Some(level) = current {
                if let Some(visit) = level.operations().visit {
                    visit(collector, level, object);
                }
                current = level.parent();
            }
        }
        _ => {
            if let Some(visit) = ty.operations().visit {
                visit(collector, ty, object);
            }
        }
    }
}

/// Invoke the destruct chain for an object being finalized.
///
/// The walk starts at the dynamic type and proceeds upward — teardown is
/// derived-first, the inverse of construction order.
pub(crate) fn finalize_object(collector: &mut Collector, ty: TypeRef, object: ObjectRef) {
    match ty.kind() {
        TypeKind::Object => {
            let mut current = Some(ty);
            while let Some(level) = current {
                if let Some(destruct) = level.operations().destruct {
                    destruct(collector, level, object);
                }
                current = level.parent();
            }
        }
        _ => {
            if let Some(destruct) = ty.operations().destruct {
                destruct(collector, ty, object);
            }
        }
    }
}

impl Collector {
    /// Allocate an instance of `ty` and run its constructor chain.
    ///
    /// The caller's argument frame must already be on `stack`. On success
    /// the returned object carries `ty` as its dynamic type.
    ///
    /// A failed construction leaves the allocation in the universe,
    /// unreachable and zero-filled where no constructor ran, so the next
    /// collection finalizes it safely. If a constructor already linked the
    /// object into a root-visible structure before failing, that link keeps
    /// the partial object alive — the failure cannot simply be caught and
    /// ignored at that point.
    ///
    /// # Errors
    ///
    /// `OperationInvalid` when `ty` has no construct operation; otherwise
    /// whatever the constructor chain reports.
    pub fn construct_object(
        &mut self,
        ty: TypeRef,
        stack: &mut ValueStack,
    ) -> ArmsResult<ObjectRef> {
        let construct = ty.operations().construct.ok_or(ArmsError::OperationInvalid)?;
        let object = self.allocate_object(ty)?;
        construct(self, ty, object, stack)?;
        Ok(object)
    }

    /// Invoke the parent constructor of `ty` on `object`.
    ///
    /// The super-constructor's argument frame must already be on `stack`.
    ///
    /// # Errors
    ///
    /// `OperationInvalid` when `ty` has no parent or the parent has no
    /// construct operation.
    pub fn construct_super(
        &mut self,
        ty: TypeRef,
        object: ObjectRef,
        stack: &mut ValueStack,
    ) -> ArmsResult<()> {
        let parent = ty.parent().ok_or(ArmsError::OperationInvalid)?;
        let construct = parent
            .operations()
            .construct
            .ok_or(ArmsError::OperationInvalid)?;
        construct(self, parent, object, stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_identity() {
        let a = Box::leak(Box::new(0u64));
        let b = Box::leak(Box::new(0u64));

        let ref_a = unsafe { ObjectRef::new(NonNull::from(&mut *a).cast()) };
        let ref_a2 = ref_a;
        let ref_b = unsafe { ObjectRef::new(NonNull::from(&mut *b).cast()) };

        assert_eq!(ref_a, ref_a2);
        assert_ne!(ref_a, ref_b);
        assert_eq!(ref_a.addr(), ref_a.as_ptr() as usize);

        unsafe {
            drop(Box::from_raw(a));
            drop(Box::from_raw(b));
        }
    }

    #[test]
    fn test_object_ref_as_map_key() {
        use std::collections::HashSet;

        let a = Box::leak(Box::new(0u64));
        let obj = unsafe { ObjectRef::new(NonNull::from(&mut *a).cast()) };

        let mut set = HashSet::new();
        set.insert(obj);
        assert!(set.contains(&obj));

        unsafe {
            drop(Box::from_raw(a));
        }
    }
}
