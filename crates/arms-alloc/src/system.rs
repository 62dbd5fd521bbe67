//! Host-heap memory manager

use std::alloc::{alloc, dealloc, realloc, Layout};
use std::ptr::NonNull;

use crate::{effective_size, AllocError, AllocResult, MemoryManager, MemoryStats, MIN_ALIGN};

/// Memory manager backed by the host heap (`std::alloc`)
///
/// This is the "Default" manager of the runtime: every request is forwarded
/// to the global allocator with an 8-byte-aligned layout. The manager keeps
/// block and byte accounting so leaks left behind by a buggy embedder show up
/// in [`MemoryStats`] instead of disappearing silently.
pub struct SystemMemoryManager {
    live_blocks: usize,
    live_bytes: usize,
    total_allocations: u64,
    total_deallocations: u64,
}

impl SystemMemoryManager {
    /// Create a new host-heap manager.
    pub fn new() -> Self {
        Self {
            live_blocks: 0,
            live_bytes: 0,
            total_allocations: 0,
            total_deallocations: 0,
        }
    }

    fn layout_for(size: usize) -> AllocResult<Layout> {
        Layout::from_size_align(size, MIN_ALIGN).map_err(|_| AllocError::ArgumentValueInvalid)
    }
}

impl MemoryManager for SystemMemoryManager {
    fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        let size = effective_size(size);
        let layout = Self::layout_for(size)?;

        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or(AllocError::AllocationFailed)?;

        self.live_blocks += 1;
        self.live_bytes += size;
        self.total_allocations += 1;
        Ok(ptr)
    }

    fn reallocate(
        &mut self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> AllocResult<NonNull<u8>> {
        let old_size = effective_size(old_size);
        let new_size = effective_size(new_size);
        if old_size == new_size {
            return Ok(ptr);
        }

        let old_layout = Self::layout_for(old_size)?;
        Self::layout_for(new_size)?;

        // On failure `realloc` leaves the original block valid, so the caller
        // keeps ownership of it.
        let grown = unsafe { realloc(ptr.as_ptr(), old_layout, new_size) };
        let grown = NonNull::new(grown).ok_or(AllocError::AllocationFailed)?;

        self.live_bytes = self.live_bytes - old_size + new_size;
        Ok(grown)
    }

    fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) -> AllocResult<()> {
        let size = effective_size(size);
        if self.live_blocks == 0 {
            return Err(AllocError::ArgumentValueInvalid);
        }
        let layout = Self::layout_for(size)?;

        unsafe { dealloc(ptr.as_ptr(), layout) };

        self.live_blocks -= 1;
        self.live_bytes = self.live_bytes.saturating_sub(size);
        self.total_deallocations += 1;
        Ok(())
    }

    fn stats(&self) -> MemoryStats {
        MemoryStats {
            live_blocks: self.live_blocks,
            live_bytes: self.live_bytes,
            total_allocations: self.total_allocations,
            total_deallocations: self.total_deallocations,
        }
    }
}

impl Default for SystemMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SystemMemoryManager {
    fn drop(&mut self) {
        if self.live_blocks > 0 {
            log::warn!(
                "system memory manager dropped with {} live blocks ({} bytes)",
                self.live_blocks,
                self.live_bytes
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_deallocate_accounting() {
        let mut manager = SystemMemoryManager::new();

        let a = manager.allocate(32).unwrap();
        let b = manager.allocate(64).unwrap();
        assert_eq!(manager.stats().live_blocks, 2);
        assert_eq!(manager.stats().live_bytes, 96);

        manager.deallocate(a, 32).unwrap();
        manager.deallocate(b, 64).unwrap();
        assert_eq!(manager.stats().live_blocks, 0);
        assert_eq!(manager.stats().live_bytes, 0);
        assert_eq!(manager.stats().total_allocations, 2);
        assert_eq!(manager.stats().total_deallocations, 2);
    }

    #[test]
    fn test_zero_byte_request_is_one_byte() {
        let mut manager = SystemMemoryManager::new();

        let ptr = manager.allocate(0).unwrap();
        assert_eq!(manager.stats().live_bytes, 1);
        manager.deallocate(ptr, 0).unwrap();
    }

    #[test]
    fn test_reallocate_same_size_is_identity() {
        let mut manager = SystemMemoryManager::new();

        let ptr = manager.allocate(40).unwrap();
        let same = manager.reallocate(ptr, 40, 40).unwrap();
        assert_eq!(ptr, same);
        manager.deallocate(same, 40).unwrap();
    }

    #[test]
    fn test_reallocate_shrink_preserves_prefix() {
        let mut manager = SystemMemoryManager::new();

        let ptr = manager.allocate(128).unwrap();
        unsafe {
            for i in 0..16u8 {
                std::ptr::write(ptr.as_ptr().add(i as usize), i);
            }
        }

        let shrunk = manager.reallocate(ptr, 128, 16).unwrap();
        for i in 0..16u8 {
            let byte = unsafe { std::ptr::read(shrunk.as_ptr().add(i as usize)) };
            assert_eq!(byte, i);
        }
        manager.deallocate(shrunk, 16).unwrap();
    }
}
