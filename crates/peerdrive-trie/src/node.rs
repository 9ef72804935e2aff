//! Trie entries.

use bytes::Bytes;

/// One live trie entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieNode {
    /// The entry's key (normalized path, no leading slash).
    pub key: String,
    /// Feed block index of the op that wrote this entry.
    pub seq: u64,
    /// The value blob.
    pub value: Bytes,
}
