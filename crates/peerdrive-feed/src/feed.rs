//! The `Feed` trait and feed identity.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use ed25519_dalek::VerifyingKey;

use crate::error::FeedError;

/// Public key identifying a feed. Doubles as the feed's address in a store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedKey([u8; 32]);

impl FeedKey {
    /// Wrap raw public key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 hex characters, for logs.
    pub fn fmt_short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Discovery key: a keyed hash of the public key, safe to announce on a
    /// network without revealing the feed key itself.
    pub fn discovery_key(&self) -> [u8; 32] {
        blake3::derive_key("peerdrive discovery key", &self.0)
    }
}

impl From<VerifyingKey> for FeedKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl TryFrom<&[u8]> for FeedKey {
    type Error = FeedError;

    fn try_from(bytes: &[u8]) -> Result<Self, FeedError> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| FeedError::InvalidKey {
            message: format!("expected 32 bytes, got {}", bytes.len()),
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedKey({})", self.fmt_short())
    }
}

/// An append-only log of opaque byte blocks.
///
/// Implementations must guarantee that a block, once visible at index `i`,
/// never changes, and that `len`/`byte_len` only grow.
#[async_trait]
pub trait Feed: Send + Sync {
    /// The feed's public key.
    fn key(&self) -> FeedKey;

    /// Whether this handle holds the signing key.
    fn writable(&self) -> bool;

    /// The signing key seed, if this handle is writable.
    fn secret_key(&self) -> Option<[u8; 32]>;

    /// Number of blocks in the feed.
    async fn len(&self) -> u64;

    /// Total byte length of all blocks.
    async fn byte_len(&self) -> u64;

    /// Append blocks, returning the index of the first appended block.
    async fn append(&self, blocks: Vec<Bytes>) -> Result<u64, FeedError>;

    /// Read block `index`.
    async fn get(&self, index: u64) -> Result<Bytes, FeedError>;

    /// Map a byte offset to `(block index, offset within that block)`.
    ///
    /// `byte_offset == byte_len` maps to `(len, 0)`.
    async fn seek(&self, byte_offset: u64) -> Result<(u64, u64), FeedError>;

    /// Resolve once the feed holds at least `len` blocks.
    async fn wait_for_len(&self, len: u64) -> Result<(), FeedError>;
}
