//! Drive-level constants.

/// First file descriptor number handed out by a drive. Kept above the
/// standard streams so drive descriptors never collide with stdio.
pub const STDIO_CAP: u64 = 20;

/// Maximum bytes per content feed block written by append sessions. Larger
/// writes are split at this boundary.
pub const WRITE_BLOCK_SIZE: usize = 64 * 1024;

/// Capacity of the drive event broadcast channel. Lagged subscribers drop
/// events rather than block operations.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

const _: () = assert!(STDIO_CAP >= 20);
const _: () = assert!(WRITE_BLOCK_SIZE > 0);
const _: () = assert!(EVENT_CHANNEL_CAPACITY > 0);
