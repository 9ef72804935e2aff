//! The persisted mutation log.

use serde::Deserialize;
use serde::Serialize;

/// One mutation, encoded with postcard as one feed block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrieOp {
    /// Insert or overwrite `key`.
    Put {
        /// The entry key.
        key: String,
        /// The value blob.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// The entry key.
        key: String,
    },
}
