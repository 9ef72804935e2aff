//! Trie error types.

use peerdrive_feed::FeedError;
use snafu::Snafu;

/// Errors from trie operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TrieError {
    /// The header block is not a valid header record.
    #[snafu(display("corrupt trie header: {message}"))]
    HeaderDecode {
        /// Why the header failed to decode.
        message: String,
    },

    /// An op block is not a valid mutation record.
    #[snafu(display("corrupt trie op at block {seq}: {message}"))]
    OpDecode {
        /// Feed block index of the bad op.
        seq: u64,
        /// Why the op failed to decode.
        message: String,
    },

    /// Mutation attempted on a historical checkout.
    #[snafu(display("trie checkout at version {version} is read-only"))]
    CheckoutReadOnly {
        /// The checkout's pinned version.
        version: u64,
    },

    /// Checkout requested before the header block.
    #[snafu(display("version {version} predates the trie header"))]
    VersionBeforeHeader {
        /// The requested version.
        version: u64,
    },

    /// Checkout requested past the current version.
    #[snafu(display("version {version} is ahead of the trie (current {current})"))]
    VersionAhead {
        /// The requested version.
        version: u64,
        /// The trie's current version.
        current: u64,
    },

    /// Invalid mount attachment.
    #[snafu(display("invalid mount: {message}"))]
    InvalidMount {
        /// Why the attachment was rejected.
        message: String,
    },

    /// Error from the backing feed.
    #[snafu(display("feed error: {source}"), context(false))]
    Feed {
        /// The underlying feed error.
        source: FeedError,
    },
}
