//! Reference-counted GC roots
//!
//! A lock pins an object across collections. Locks are the only roots the
//! collector knows — there is no stack scanning — so callers must lock
//! anything that has to survive a `run`.
//!
//! Unlocking decrements the count but leaves the entry in the table; the
//! premark phase removes zero-count entries lazily on the next cycle.

use rustc_hash::FxHashMap;

use crate::object::ObjectRef;
use crate::{ArmsError, ArmsResult};

/// Table of reference-counted root pins
#[derive(Default)]
pub(crate) struct LockTable {
    entries: FxHashMap<ObjectRef, usize>,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Add one pin to `object`.
    pub(crate) fn lock(&mut self, object: ObjectRef) {
        *self.entries.entry(object).or_insert(0) += 1;
    }

    /// Remove one pin from `object`.
    ///
    /// # Errors
    ///
    /// `OperationInvalid` when the object has no entry or its count is
    /// already zero.
    pub(crate) fn unlock(&mut self, object: ObjectRef) -> ArmsResult<()> {
        match self.entries.get_mut(&object) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Ok(())
            }
            _ => Err(ArmsError::OperationInvalid),
        }
    }

    /// Current pin count of `object` (zero when absent).
    pub(crate) fn count(&self, object: ObjectRef) -> usize {
        self.entries.get(&object).copied().unwrap_or(0)
    }

    /// Snapshot of every object with a positive count.
    pub(crate) fn pinned(&self) -> Vec<ObjectRef> {
        self.entries
            .iter()
            .filter(|&(_, &count)| count > 0)
            .map(|(&object, _)| object)
            .collect()
    }

    /// Drop entries whose count reached zero.
    pub(crate) fn remove_released(&mut self) {
        self.entries.retain(|_, count| *count > 0);
    }

    /// Every object that still has an entry, pinned or released.
    pub(crate) fn targets(&self) -> Vec<ObjectRef> {
        self.entries.keys().copied().collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
