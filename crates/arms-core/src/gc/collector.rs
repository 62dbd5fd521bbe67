//! The ARMS collector
//!
//! Owns the memory managers, the type registry, the universe of tagged
//! allocations, the gray worklist, and the lock table. Collection is
//! synchronous and stop-the-world: nothing happens until [`Collector::run`]
//! is invoked, and no allocation may run concurrently with a sweep.

use std::ptr::NonNull;
use std::time::{Duration, Instant};

use arms_alloc::{MemoryManager, MemoryStats, SlabMemoryManager, SystemMemoryManager};

use super::lock::LockTable;
use super::notify::{NotifyDestroy, NotifyId};
use super::tag::{Color, Tag};
use crate::object::{finalize_object, visit_object, ObjectRef};
use crate::types::TypeRef;
use crate::{ArmsError, ArmsResult};

/// Which memory manager backs managed allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorKind {
    /// Host heap (the "Default" manager)
    System,
    /// Slab arena
    Slab,
}

/// Collector startup options
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    /// Manager serving managed allocations
    pub allocator: AllocatorKind,

    /// Chunk size of the slab manager in bytes
    pub slab_chunk_size: usize,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            allocator: AllocatorKind::System,
            slab_chunk_size: crate::defaults::DEFAULT_SLAB_CHUNK_SIZE,
        }
    }
}

/// Report of one collection cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Objects pinned by a positive-count lock at premark
    pub locked: usize,

    /// Objects that survived the sweep
    pub live: usize,

    /// Objects finalized and released by the sweep
    pub swept: usize,
}

/// Cumulative collector statistics
#[derive(Debug, Clone)]
pub struct CollectorStats {
    /// Total collection cycles run
    pub collections: usize,

    /// Total objects swept over the collector's lifetime
    pub objects_swept: usize,

    /// Locked count of the last cycle
    pub last_locked: usize,

    /// Objects drained from the gray worklist in the last cycle
    pub last_marked: usize,

    /// Live count of the last cycle
    pub last_live: usize,

    /// Swept count of the last cycle
    pub last_swept: usize,

    /// Total pause time across all cycles
    pub total_pause: Duration,

    /// Last cycle duration
    pub last_pause: Duration,

    /// Longest cycle duration
    pub max_pause: Duration,
}

impl Default for CollectorStats {
    fn default() -> Self {
        Self {
            collections: 0,
            objects_swept: 0,
            last_locked: 0,
            last_marked: 0,
            last_live: 0,
            last_swept: 0,
            total_pause: Duration::ZERO,
            last_pause: Duration::ZERO,
            max_pause: Duration::ZERO,
        }
    }
}

impl CollectorStats {
    fn update(&mut self, pause: Duration, marked: usize, report: CycleReport) {
        self.collections += 1;
        self.objects_swept += report.swept;
        self.last_locked = report.locked;
        self.last_marked = marked;
        self.last_live = report.live;
        self.last_swept = report.swept;
        self.total_pause += pause;
        self.last_pause = pause;
        if pause > self.max_pause {
            self.max_pause = pause;
        }
    }
}

/// Both memory managers, built at first startup and dropped at the last
/// shutdown; `kind` selects which one serves managed allocations.
struct Heap {
    system: SystemMemoryManager,
    slab: SlabMemoryManager,
    kind: AllocatorKind,
}

impl Heap {
    fn new(options: &CollectorOptions) -> Self {
        Self {
            system: SystemMemoryManager::new(),
            slab: SlabMemoryManager::new(options.slab_chunk_size),
            kind: options.allocator,
        }
    }

    fn manager(&mut self) -> &mut dyn MemoryManager {
        match self.kind {
            AllocatorKind::System => &mut self.system,
            AllocatorKind::Slab => &mut self.slab,
        }
    }

    fn manager_ref(&self) -> &dyn MemoryManager {
        match self.kind {
            AllocatorKind::System => &self.system,
            AllocatorKind::Slab => &self.slab,
        }
    }
}

/// Abort the process over a programmer error detected at shutdown.
///
/// Tearing down with foreign live state risks silent corruption — a leaked
/// cycle, a dangling root, a double free — so the collector terminates
/// instead.
fn fatal(message: &str) -> ! {
    log::error!("arms: {}", message);
    std::process::abort();
}

/// The ARMS garbage collector and type registry
///
/// Created Uninitialized by [`Collector::new`]; [`Collector::startup`] and
/// [`Collector::shutdown`] are reference-counted, so nested embedders can
/// each bracket their use. Most operations fail `OperationInvalid` before
/// the first startup and after the last shutdown.
pub struct Collector {
    options: CollectorOptions,
    startups: usize,
    heap: Option<Heap>,
    pub(crate) registry: Vec<TypeRef>,
    pub(crate) bootstrap: Option<TypeRef>,
    universe: Vec<*mut Tag>,
    gray: Vec<*mut Tag>,
    pub(crate) locks: LockTable,
    notify: NotifyDestroy,
    stats: CollectorStats,
}

impl Collector {
    /// Create an uninitialized collector.
    pub fn new(options: CollectorOptions) -> Self {
        Self {
            options,
            startups: 0,
            heap: None,
            registry: Vec::new(),
            bootstrap: None,
            universe: Vec::with_capacity(crate::defaults::INITIAL_UNIVERSE_CAPACITY),
            gray: Vec::new(),
            locks: LockTable::new(),
            notify: NotifyDestroy::new(),
            stats: CollectorStats::default(),
        }
    }

    /// Whether the collector has been started.
    pub fn is_started(&self) -> bool {
        self.startups > 0
    }

    /// Start the collector.
    ///
    /// Reference-counted: the first call constructs both memory managers,
    /// clears every table, and registers the bootstrap type; later calls
    /// only increment the count.
    pub fn startup(&mut self) -> ArmsResult<()> {
        self.startups += 1;
        if self.startups > 1 {
            return Ok(());
        }

        self.heap = Some(Heap::new(&self.options));
        self.registry.clear();
        self.universe.clear();
        self.gray.clear();
        self.locks.clear();
        self.notify.clear();
        self.stats = CollectorStats::default();

        if let Err(err) = self.register_bootstrap_type() {
            self.heap = None;
            self.startups = 0;
            return Err(err);
        }

        log::debug!("collector started ({:?} allocator)", self.options.allocator);
        Ok(())
    }

    /// Shut the collector down.
    ///
    /// Reference-counted: only the last call tears down. At that point every
    /// tracked object and every lock must belong to the type registry;
    /// anything else is a leaked cycle or an outstanding root, and the
    /// process aborts rather than risk silent corruption. A clean teardown
    /// unregisters every type (firing its removal callback), collects until
    /// the universe drains, and drops both memory managers.
    ///
    /// # Errors
    ///
    /// `OperationInvalid` when the collector is not started.
    pub fn shutdown(&mut self) -> ArmsResult<()> {
        if self.startups == 0 {
            return Err(ArmsError::OperationInvalid);
        }
        self.startups -= 1;
        if self.startups > 0 {
            return Ok(());
        }

        for &tag in &self.universe {
            let object = unsafe { ObjectRef::from_tag(tag) };
            if !self.registry_owns(object) {
                fatal("shutdown with a live object outside the type registry");
            }
        }
        if !self.gray.is_empty() {
            fatal("shutdown during an unfinished collection");
        }
        for object in self.locks.targets() {
            if !self.registry_owns(object) {
                fatal("shutdown with an outstanding lock");
            }
        }

        self.unregister_all_types();

        // Parent locks release as child type nodes finalize, so one cycle is
        // not enough for deep hierarchies; collect until quiescent.
        loop {
            let report = self.run();
            if report.swept == 0 {
                break;
            }
        }

        if !self.universe.is_empty() || !self.gray.is_empty() || !self.locks.is_empty() {
            fatal("shutdown left managed state behind");
        }

        self.notify.clear();
        self.heap = None;
        log::debug!("collector shut down");
        Ok(())
    }

    /// Allocate `size` payload bytes under the type named `type_name`.
    ///
    /// The payload is zero-filled and the new object starts white and
    /// unlocked: it will not survive a collection unless the caller locks it
    /// or a visited object references it.
    ///
    /// # Errors
    ///
    /// `TypeNotExists` for an unknown name, `OperationInvalid` before
    /// startup, `AllocationFailed` when the manager gives up.
    pub fn allocate(&mut self, type_name: &str, size: usize) -> ArmsResult<ObjectRef> {
        let ty = self.find_type(type_name)?;
        self.allocate_raw(Some(ty), size)
    }

    /// Allocate an instance of `ty` sized by the type's value size.
    pub fn allocate_object(&mut self, ty: TypeRef) -> ArmsResult<ObjectRef> {
        self.allocate_raw(Some(ty), ty.value_size())
    }

    pub(crate) fn allocate_raw(
        &mut self,
        ty: Option<TypeRef>,
        size: usize,
    ) -> ArmsResult<ObjectRef> {
        let heap = self.heap.as_mut().ok_or(ArmsError::OperationInvalid)?;
        let total = std::mem::size_of::<Tag>()
            .checked_add(size)
            .ok_or(ArmsError::ArgumentValueInvalid)?;

        let ptr = heap.manager().allocate(total)?;
        let tag = ptr.as_ptr().cast::<Tag>();
        unsafe {
            tag.write(Tag::new(ty, size));
            // Zero-filled payloads keep partially-constructed objects safe
            // to finalize.
            std::ptr::write_bytes(ptr.as_ptr().add(std::mem::size_of::<Tag>()), 0, size);
        }
        self.universe.push(tag);
        Ok(unsafe { ObjectRef::from_tag(tag) })
    }

    /// Restamp the dynamic type of a live managed object.
    ///
    /// The construction protocol calls this at every level; the most-derived
    /// constructor stamps last and wins.
    pub fn set_type(&mut self, object: ObjectRef, ty: TypeRef) {
        unsafe { (*object.tag_ptr()).set_ty(ty) };
    }

    /// Dynamic type of a live managed object.
    pub fn type_of(&self, object: ObjectRef) -> Option<TypeRef> {
        unsafe { (*object.tag_ptr()).ty() }
    }

    /// Pin `object` as a GC root.
    pub fn lock(&mut self, object: ObjectRef) {
        self.locks.lock(object);
    }

    /// Release one pin on `object`.
    ///
    /// # Errors
    ///
    /// `OperationInvalid` when the object is not locked (including a second
    /// unlock after the count reached zero).
    pub fn unlock(&mut self, object: ObjectRef) -> ArmsResult<()> {
        self.locks.unlock(object)
    }

    /// Current pin count of `object`.
    pub fn lock_count(&self, object: ObjectRef) -> usize {
        self.locks.count(object)
    }

    /// Register a callback fired exactly once when `object` is finalized,
    /// before its destruct chain runs.
    pub fn notify_destroy(
        &mut self,
        object: ObjectRef,
        callback: impl FnOnce(ObjectRef) + 'static,
    ) -> NotifyId {
        self.notify.register(object, Box::new(callback))
    }

    /// Cancel a destroy notification.
    ///
    /// # Errors
    ///
    /// `OperationInvalid` when no matching registration exists.
    pub fn cancel_notify(&mut self, object: ObjectRef, id: NotifyId) -> ArmsResult<()> {
        self.notify.cancel(object, id)
    }

    /// Visit an object during marking.
    ///
    /// White objects whose type chain carries a visit operation turn gray
    /// and join the worklist; white objects without one are reachability
    /// leaves and blacken directly. Gray and black objects are untouched.
    pub fn visit(&mut self, object: ObjectRef) {
        let tag = unsafe { object.tag_ptr() };
        unsafe {
            if (*tag).color() != Color::White {
                return;
            }
            let scan = (*tag).ty().is_some_and(|ty| ty.scan_required());
            if scan {
                (*tag).set_color(Color::Gray);
                self.gray.push(tag);
            } else {
                (*tag).set_color(Color::Black);
            }
        }
    }

    /// Run one collection cycle: premark, mark, sweep.
    pub fn run(&mut self) -> CycleReport {
        let start = Instant::now();

        log::trace!("premark: visiting pinned roots");
        let locked = self.premark();

        log::trace!("mark: draining gray worklist");
        let marked = self.mark();

        log::trace!("sweep: walking the universe");
        let (live, swept) = self.sweep();

        let report = CycleReport { locked, live, swept };
        let pause = start.elapsed();
        self.stats.update(pause, marked, report);
        log::debug!(
            "collection #{}: {} locked, {} marked, {} live, {} swept in {:?}",
            self.stats.collections,
            locked,
            marked,
            live,
            swept,
            pause
        );
        report
    }

    /// Gray every pinned object; drop lock entries whose count reached zero.
    fn premark(&mut self) -> usize {
        // Snapshot first: visiting pushes onto the gray list while the table
        // would otherwise be borrowed.
        let pinned = self.locks.pinned();
        self.locks.remove_released();
        for &object in &pinned {
            self.visit(object);
        }
        pinned.len()
    }

    /// Drain the gray worklist, blackening and scanning each object.
    fn mark(&mut self) -> usize {
        let mut marked = 0;
        while let Some(tag) = self.gray.pop() {
            let (ty, object) = unsafe {
                (*tag).set_color(Color::Black);
                ((*tag).ty(), ObjectRef::from_tag(tag))
            };
            marked += 1;
            if let Some(ty) = ty {
                visit_object(self, ty, object);
            }
        }
        marked
    }

    /// Walk the universe once: finalize and release white tags, recolor
    /// black survivors white for the next cycle.
    fn sweep(&mut self) -> (usize, usize) {
        let mut live = 0;
        let mut swept = 0;

        let universe = std::mem::take(&mut self.universe);
        let mut survivors = Vec::with_capacity(universe.len());

        for tag in universe {
            if unsafe { (*tag).color() } != Color::White {
                unsafe { (*tag).set_color(Color::White) };
                live += 1;
                survivors.push(tag);
                continue;
            }

            let object = unsafe { ObjectRef::from_tag(tag) };
            self.notify.fire(object);
            if let Some(ty) = unsafe { (*tag).ty() } {
                finalize_object(self, ty, object);
            }

            let total = unsafe { (*tag).allocation_size() };
            let block = unsafe { NonNull::new_unchecked(tag.cast::<u8>()) };
            if let Some(heap) = self.heap.as_mut() {
                if let Err(err) = heap.manager().deallocate(block, total) {
                    log::error!("sweep could not release {:#x}: {}", object.addr(), err);
                }
            }
            swept += 1;
        }

        // A finalizer is not allowed to allocate mid-sweep, but anything that
        // slipped into the fresh universe stays tracked.
        survivors.append(&mut self.universe);
        self.universe = survivors;
        (live, swept)
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    /// Number of allocations currently tracked in the universe.
    pub fn tracked_objects(&self) -> usize {
        self.universe.len()
    }

    /// Accounting snapshot of the active memory manager.
    pub fn memory_stats(&self) -> MemoryStats {
        self.heap
            .as_ref()
            .map(|heap| heap.manager_ref().stats())
            .unwrap_or_default()
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(CollectorOptions::default())
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        // Dropping a started collector releases raw memory without firing
        // finalizers; the leak checks live on the explicit shutdown path.
        if self.heap.is_some() && !self.universe.is_empty() {
            let universe = std::mem::take(&mut self.universe);
            let heap = self.heap.as_mut().expect("heap present");
            for tag in universe {
                let total = unsafe { (*tag).allocation_size() };
                let block = unsafe { NonNull::new_unchecked(tag.cast::<u8>()) };
                let _ = heap.manager().deallocate(block, total);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_collector_is_uninitialized() {
        let mut collector = Collector::default();
        assert!(!collector.is_started());
        assert_eq!(
            collector.allocate("arms.Type", 8),
            Err(ArmsError::OperationInvalid)
        );
        assert_eq!(collector.shutdown(), Err(ArmsError::OperationInvalid));
    }

    #[test]
    fn test_run_on_empty_collector_reports_zero() {
        let mut collector = Collector::default();

        let report = collector.run();
        assert_eq!(report, CycleReport::default());
        assert_eq!(collector.stats().collections, 1);
        assert_eq!(collector.stats().objects_swept, 0);
    }

    #[test]
    fn test_startup_shutdown_reference_counting() {
        let mut collector = Collector::default();

        collector.startup().unwrap();
        collector.startup().unwrap();
        assert!(collector.is_started());

        collector.shutdown().unwrap();
        // One startup still outstanding.
        assert!(collector.is_started());
        assert!(collector.find_type("arms.Type").is_ok());

        collector.shutdown().unwrap();
        assert!(!collector.is_started());
        assert_eq!(
            collector.find_type("arms.Type"),
            Err(ArmsError::TypeNotExists)
        );
    }

    #[test]
    fn test_startup_registers_bootstrap_type() {
        let mut collector = Collector::default();
        collector.startup().unwrap();

        let bootstrap = collector.find_type("arms.Type").unwrap();
        assert_eq!(bootstrap.name(), "arms.Type");
        assert_eq!(collector.tracked_objects(), 1);
        assert_eq!(collector.lock_count(bootstrap.as_object()), 1);

        collector.shutdown().unwrap();
        assert_eq!(collector.tracked_objects(), 0);
    }

    #[test]
    fn test_unreachable_allocation_is_swept() {
        let mut collector = Collector::default();
        collector.startup().unwrap();
        collector
            .register_foreign_value_type("test.Blob", 32, crate::TypeOperations::none(), None)
            .unwrap();

        let object = collector.allocate("test.Blob", 32).unwrap();
        assert_eq!(collector.tracked_objects(), 3);
        assert!(collector.type_of(object).is_some());

        // Never locked: the next run collects it. The two type nodes stay
        // pinned by their registration locks.
        let report = collector.run();
        assert_eq!(report.locked, 2);
        assert_eq!(report.live, 2);
        assert_eq!(report.swept, 1);

        collector.shutdown().unwrap();
    }

    #[test]
    fn test_slab_collector_round_trip() {
        let mut collector = Collector::new(CollectorOptions {
            allocator: AllocatorKind::Slab,
            ..CollectorOptions::default()
        });
        collector.startup().unwrap();
        collector
            .register_foreign_value_type("test.Blob", 48, crate::TypeOperations::none(), None)
            .unwrap();

        let object = collector.allocate("test.Blob", 48).unwrap();
        collector.lock(object);
        let report = collector.run();
        assert_eq!(report.swept, 0);

        collector.unlock(object).unwrap();
        let report = collector.run();
        assert_eq!(report.swept, 1);

        collector.shutdown().unwrap();
    }

    #[test]
    fn test_memory_stats_track_universe() {
        let mut collector = Collector::default();
        collector.startup().unwrap();
        collector
            .register_foreign_value_type("test.Blob", 64, crate::TypeOperations::none(), None)
            .unwrap();

        let before = collector.memory_stats();
        let _object = collector.allocate("test.Blob", 64).unwrap();
        let after = collector.memory_stats();
        assert_eq!(after.live_blocks, before.live_blocks + 1);

        collector.run();
        assert_eq!(collector.memory_stats().live_blocks, before.live_blocks);

        collector.shutdown().unwrap();
    }
}
