//! Stat records for peerdrive.
//!
//! A stat record describes one filesystem entry and is stored as the value
//! blob of that entry's key in the metadata trie. This crate provides:
//!
//! - **`Stat`**: a tagged sum of the three entry variants (file, directory,
//!   symlink), each optionally carrying a `Mount` attachment
//! - **Wire codec**: protobuf encode/decode of stat records, bit-compatible
//!   with the `hyperdrive-schemas` `Stat` message so records round-trip with
//!   peer drives written against that schema
//!
//! File stats reference a contiguous block range of the owning content feed:
//! bytes `[byte_offset, byte_offset + size)` span exactly `blocks` blocks
//! starting at block `offset`. Directory and symlink stats carry no content
//! reference.

mod stat;
mod wire;

pub use stat::DEFAULT_DIR_MODE;
pub use stat::DEFAULT_FILE_MODE;
pub use stat::DEFAULT_SYMLINK_MODE;
pub use stat::Mount;
pub use stat::S_IFDIR;
pub use stat::S_IFLNK;
pub use stat::S_IFMT;
pub use stat::S_IFREG;
pub use stat::Stat;
pub use stat::StatKind;
pub use wire::StatCodecError;
