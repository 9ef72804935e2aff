//! peerdrive: a peer-to-peer versioned filesystem over append-only
//! verified logs.
//!
//! A drive is a pair of feeds: a **metadata feed** whose blocks form a
//! prefix-indexed trie of stat records, and a **content feed** whose byte
//! stream holds file payloads. File data lives as contiguous block ranges
//! in the content feed; a file's stat records `(offset, byte_offset, blocks,
//! size)` and is only committed to the trie after its bytes are appended,
//! so readers that resolve a stat always find the referenced range present.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use peerdrive::Drive;
//! use peerdrive::DriveOptions;
//! use peerdrive::WriteOptions;
//! use peerdrive_feed::MemoryFeedStore;
//!
//! # async fn demo() -> Result<(), peerdrive::DriveError> {
//! let store = Arc::new(MemoryFeedStore::new());
//! let drive = Drive::new(store, DriveOptions::default()).await?;
//!
//! drive.write_file("/hello.txt", b"hello world", WriteOptions::default()).await?;
//! let text = drive.read_file_string("/hello.txt").await?;
//! assert_eq!(text, "hello world");
//! # Ok(())
//! # }
//! ```
//!
//! Subtrees can be served by foreign tries or raw content feeds
//! (`Drive::mount`), historical versions are readable through
//! `Drive::checkout`, and peers sync by replicating both feeds through the
//! backing [`peerdrive_feed::FeedStore`].

mod constants;
mod content;
mod drive;
mod error;
mod events;
mod fd;
mod paths;
mod stream;

pub use constants::STDIO_CAP;
pub use constants::WRITE_BLOCK_SIZE;
pub use content::ContentState;
pub use drive::Drive;
pub use drive::DriveOptions;
pub use drive::MountOptions;
pub use error::DriveError;
pub use events::DriveEvent;
pub use events::EventBroadcaster;
pub use fd::OpenMode;
pub use peerdrive_feed::FeedKey;
pub use peerdrive_trie::TrieWatcher;
pub use peerdrive_types::Mount;
pub use peerdrive_types::Stat;
pub use peerdrive_types::StatKind;
pub use stream::ReadStreamOptions;
pub use stream::WriteOptions;
pub use stream::WriteStream;
