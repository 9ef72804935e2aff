//! Append-only log ("feed") abstraction for peerdrive.
//!
//! A feed is an ordered sequence of opaque byte blocks with an ed25519
//! keypair as its identity. Block `i` is immutable once appended. Feeds
//! observe `len` (block count) and `byte_len` (sum of block sizes), and a
//! feed is writable iff its holder has the signing key.
//!
//! This crate provides:
//!
//! - **`Feed`**: the log trait (append/get, byte `seek`, length waiting)
//! - **`MemoryFeed`**: an in-memory implementation backing tests and local
//!   drives, the way a networked log implementation would back production
//! - **`byte_stream` / `read_range`**: the block-range byte streamer that
//!   translates `(byte offset, byte length)` into block reads
//! - **`FeedStore`**: the storage backend trait that owns feeds, hands them
//!   out by public key, and replicates them between stores
//!
//! Verification and peer transport live below this interface: a store hands
//! out blocks it has already verified against the feed's key.

mod error;
mod feed;
mod memory;
mod store;
mod stream;

pub use ed25519_dalek::SigningKey;
pub use error::FeedError;
pub use feed::Feed;
pub use feed::FeedKey;
pub use memory::MemoryFeed;
pub use store::FeedStore;
pub use store::MemoryFeedStore;
pub use store::derive_content_keypair;
pub use stream::ByteStreamOptions;
pub use stream::READ_STREAM_HIGH_WATER_MARK;
pub use stream::byte_stream;
pub use stream::read_range;
