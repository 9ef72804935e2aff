//! Drive error types with POSIX errno mapping.

use peerdrive_feed::FeedError;
use peerdrive_trie::TrieError;
use peerdrive_types::StatCodecError;
use snafu::Snafu;

/// Errors from drive operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DriveError {
    /// Stat lookup miss on a required file.
    #[snafu(display("file not found: {path}"))]
    FileNotFound {
        /// The path that failed to resolve.
        path: String,
    },

    /// Conditional put rejected; mkdir/symlink collision.
    #[snafu(display("path already exists: {path}"))]
    PathAlreadyExists {
        /// The colliding path.
        path: String,
    },

    /// rmdir of a directory with children.
    #[snafu(display("directory not empty: {path}"))]
    DirectoryNotEmpty {
        /// The non-empty directory.
        path: String,
    },

    /// Invalid descriptor passed to read/write/close.
    #[snafu(display("bad file descriptor: {fd}"))]
    BadFileDescriptor {
        /// The offending descriptor number.
        fd: u64,
    },

    /// File operation on a directory.
    #[snafu(display("is a directory: {path}"))]
    IsADirectory {
        /// The path that resolved to a directory.
        path: String,
    },

    /// readlink of a non-symlink entry.
    #[snafu(display("not a symlink: {path}"))]
    NotASymlink {
        /// The path that is not a symlink.
        path: String,
    },

    /// File contents requested as text are not valid UTF-8.
    #[snafu(display("file contents are not valid utf-8: {path}"))]
    NotUtf8 {
        /// The path holding non-UTF-8 bytes.
        path: String,
    },

    /// Corrupt stat blob in the trie.
    #[snafu(display("corrupt stat record at {path}: {source}"))]
    Decode {
        /// The path whose record failed to decode.
        path: String,
        /// The underlying codec error.
        source: StatCodecError,
    },

    /// The trie header carries no content feed key.
    #[snafu(display("trie header has no content feed key"))]
    MissingContentKey,

    /// Wrapped feed error.
    #[snafu(display("feed error: {source}"), context(false))]
    Feed {
        /// The underlying feed error.
        source: FeedError,
    },

    /// Wrapped trie error.
    #[snafu(display("trie error: {source}"), context(false))]
    Trie {
        /// The underlying trie error.
        source: TrieError,
    },
}

impl DriveError {
    /// POSIX errno for error kinds that map onto one.
    ///
    /// `errno() == Some(2)` is the "absent, not a fault" probe used by
    /// compound operations such as truncate and symlink.
    pub fn errno(&self) -> Option<i32> {
        match self {
            DriveError::FileNotFound { .. } => Some(2),
            DriveError::BadFileDescriptor { .. } => Some(9),
            DriveError::PathAlreadyExists { .. } => Some(17),
            DriveError::IsADirectory { .. } => Some(21),
            DriveError::NotASymlink { .. } => Some(22),
            DriveError::DirectoryNotEmpty { .. } => Some(39),
            _ => None,
        }
    }
}
