//! Feed error types.

use snafu::Snafu;

/// Errors from feed and feed store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FeedError {
    /// Block index past the end of the feed.
    #[snafu(display("block {index} out of range (feed has {len} blocks)"))]
    BlockOutOfRange {
        /// The requested block index.
        index: u64,
        /// The feed's block count at the time of the request.
        len: u64,
    },

    /// Byte range past the end of the feed.
    #[snafu(display("byte range [{start}, {end}) out of range (feed has {byte_len} bytes)"))]
    ByteRangeOutOfRange {
        /// First requested byte.
        start: u64,
        /// One past the last requested byte.
        end: u64,
        /// The feed's byte length at the time of the request.
        byte_len: u64,
    },

    /// Append attempted without the signing key.
    #[snafu(display("feed {key} is not writable"))]
    NotWritable {
        /// Short form of the feed's public key.
        key: String,
    },

    /// Operation on a closed feed.
    #[snafu(display("feed {key} is closed"))]
    Closed {
        /// Short form of the feed's public key.
        key: String,
    },

    /// Key bytes do not form a valid public key.
    #[snafu(display("invalid feed key: {message}"))]
    InvalidKey {
        /// Why the key was rejected.
        message: String,
    },

    /// Backend storage failure.
    #[snafu(display("storage error: {message}"))]
    Storage {
        /// Human-readable description of the failure.
        message: String,
    },
}
