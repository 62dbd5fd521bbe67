//! Default constants for collector configuration.

/// Default slab chunk size in bytes (64 KiB).
pub const DEFAULT_SLAB_CHUNK_SIZE: usize = 64 * 1024;

/// Default maximum operand stack size (in values).
pub const DEFAULT_VALUE_STACK_SIZE: usize = 1024 * 16;

/// Initial capacity of the universe and gray worklist.
pub const INITIAL_UNIVERSE_CAPACITY: usize = 1024;
