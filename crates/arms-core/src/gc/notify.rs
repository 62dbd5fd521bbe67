//! Finalization notification side table
//!
//! Maps an object to callbacks fired exactly once when the sweep finalizes
//! it, before its destruct chain runs. Registrations can be cancelled with
//! the id handed back at registration time.

use rustc_hash::FxHashMap;

use crate::object::ObjectRef;
use crate::{ArmsError, ArmsResult};

/// Handle for cancelling a destroy notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifyId(u64);

type NotifyCallback = Box<dyn FnOnce(ObjectRef)>;

/// Side table of destroy notifications
#[derive(Default)]
pub(crate) struct NotifyDestroy {
    entries: FxHashMap<ObjectRef, Vec<(NotifyId, NotifyCallback)>>,
    next_id: u64,
}

impl NotifyDestroy {
    pub(crate) fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            next_id: 0,
        }
    }

    /// Register a callback for `object`.
    pub(crate) fn register(&mut self, object: ObjectRef, callback: NotifyCallback) -> NotifyId {
        let id = NotifyId(self.next_id);
        self.next_id += 1;
        self.entries.entry(object).or_default().push((id, callback));
        id
    }

    /// Cancel a registration.
    ///
    /// # Errors
    ///
    /// `OperationInvalid` when no matching registration exists (including a
    /// second cancel of the same id).
    pub(crate) fn cancel(&mut self, object: ObjectRef, id: NotifyId) -> ArmsResult<()> {
        let callbacks = self
            .entries
            .get_mut(&object)
            .ok_or(ArmsError::OperationInvalid)?;
        let position = callbacks
            .iter()
            .position(|(entry_id, _)| *entry_id == id)
            .ok_or(ArmsError::OperationInvalid)?;
        callbacks.swap_remove(position);
        if callbacks.is_empty() {
            self.entries.remove(&object);
        }
        Ok(())
    }

    /// Fire and drop every callback registered for `object`.
    pub(crate) fn fire(&mut self, object: ObjectRef) {
        if let Some(callbacks) = self.entries.remove(&object) {
            for (_, callback) in callbacks {
                callback(object);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fake_object(slot: &mut u64) -> ObjectRef {
        unsafe { ObjectRef::new(NonNull::from(slot).cast()) }
    }

    #[test]
    fn test_fire_invokes_once_and_drains() {
        let mut slot = 0u64;
        let object = fake_object(&mut slot);
        let mut table = NotifyDestroy::new();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        table.register(object, Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        table.fire(object);
        table.fire(object);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let mut slot = 0u64;
        let object = fake_object(&mut slot);
        let mut table = NotifyDestroy::new();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let id = table.register(object, Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        table.cancel(object, id).unwrap();
        table.fire(object);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_double_cancel_fails() {
        let mut slot = 0u64;
        let object = fake_object(&mut slot);
        let mut table = NotifyDestroy::new();

        let id = table.register(object, Box::new(|_| {}));
        table.cancel(object, id).unwrap();
        assert_eq!(table.cancel(object, id), Err(ArmsError::OperationInvalid));
    }

    #[test]
    fn test_cancel_one_of_many() {
        let mut slot = 0u64;
        let object = fake_object(&mut slot);
        let mut table = NotifyDestroy::new();

        let fired = Arc::new(AtomicUsize::new(0));
        let keep = Arc::clone(&fired);
        let cancel = Arc::clone(&fired);

        let _keep_id = table.register(object, Box::new(move |_| {
            keep.fetch_add(1, Ordering::SeqCst);
        }));
        let cancel_id = table.register(object, Box::new(move |_| {
            cancel.fetch_add(10, Ordering::SeqCst);
        }));

        table.cancel(object, cancel_id).unwrap();
        table.fire(object);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
