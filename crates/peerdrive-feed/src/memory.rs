//! In-memory feed implementation.

use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use tokio::sync::watch;
use tracing::trace;

use crate::error::FeedError;
use crate::feed::Feed;
use crate::feed::FeedKey;

#[derive(Default)]
struct FeedState {
    blocks: Vec<Bytes>,
    /// Cumulative start byte of each block; `starts[i]` is the first byte
    /// index of block `i`.
    starts: Vec<u64>,
    byte_len: u64,
    closed: bool,
}

/// An in-memory feed.
///
/// Keeps blocks in a `Vec` alongside a cumulative byte index so `seek` is a
/// binary search. Length changes are published on a watch channel so
/// readers can block on `wait_for_len` until replication catches up.
///
/// Clones of the `Arc`-wrapped feed share storage; the store hands out one
/// instance per key.
pub struct MemoryFeed {
    verifying: VerifyingKey,
    signing: Option<SigningKey>,
    state: RwLock<FeedState>,
    /// (block count, closed) for waiters.
    length: watch::Sender<(u64, bool)>,
}

impl MemoryFeed {
    /// Create a writable feed with a fresh random keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&rand::random()))
    }

    /// Create a writable feed from an existing signing key.
    pub fn from_signing_key(signing: SigningKey) -> Self {
        let verifying = signing.verifying_key();
        Self {
            verifying,
            signing: Some(signing),
            state: RwLock::new(FeedState::default()),
            length: watch::Sender::new((0, false)),
        }
    }

    /// Create a read-only feed handle for a foreign key. Blocks arrive via
    /// replication (`extend_verified`).
    pub fn observer(verifying: VerifyingKey) -> Self {
        Self {
            verifying,
            signing: None,
            state: RwLock::new(FeedState::default()),
            length: watch::Sender::new((0, false)),
        }
    }

    /// Mark the feed closed. Subsequent block operations fail and pending
    /// `wait_for_len` calls resolve with an error.
    pub fn close(&self) {
        let mut state = self.state.write().expect("feed lock poisoned");
        state.closed = true;
        let len = state.blocks.len() as u64;
        drop(state);
        self.length.send_replace((len, true));
    }

    /// Append blocks that were verified upstream (replication path). Skips
    /// the writable check; never exposed outside the store.
    pub(crate) fn extend_verified(&self, blocks: Vec<Bytes>) -> Result<u64, FeedError> {
        self.push_blocks(blocks)
    }

    fn push_blocks(&self, blocks: Vec<Bytes>) -> Result<u64, FeedError> {
        let mut state = self.state.write().expect("feed lock poisoned");
        if state.closed {
            return Err(FeedError::Closed {
                key: self.key().fmt_short(),
            });
        }
        let first = state.blocks.len() as u64;
        for block in blocks {
            let byte_len = state.byte_len;
            state.starts.push(byte_len);
            state.byte_len += block.len() as u64;
            state.blocks.push(block);
        }
        let len = state.blocks.len() as u64;
        drop(state);
        self.length.send_replace((len, false));
        trace!(key = %self.key().fmt_short(), len, "feed appended");
        Ok(first)
    }
}

#[async_trait]
impl Feed for MemoryFeed {
    fn key(&self) -> FeedKey {
        FeedKey::from(self.verifying)
    }

    fn writable(&self) -> bool {
        self.signing.is_some()
    }

    fn secret_key(&self) -> Option<[u8; 32]> {
        self.signing.as_ref().map(|s| s.to_bytes())
    }

    async fn len(&self) -> u64 {
        self.state.read().expect("feed lock poisoned").blocks.len() as u64
    }

    async fn byte_len(&self) -> u64 {
        self.state.read().expect("feed lock poisoned").byte_len
    }

    async fn append(&self, blocks: Vec<Bytes>) -> Result<u64, FeedError> {
        if self.signing.is_none() {
            return Err(FeedError::NotWritable {
                key: self.key().fmt_short(),
            });
        }
        self.push_blocks(blocks)
    }

    async fn get(&self, index: u64) -> Result<Bytes, FeedError> {
        let state = self.state.read().expect("feed lock poisoned");
        if state.closed {
            return Err(FeedError::Closed {
                key: self.key().fmt_short(),
            });
        }
        state.blocks.get(index as usize).cloned().ok_or(FeedError::BlockOutOfRange {
            index,
            len: state.blocks.len() as u64,
        })
    }

    async fn seek(&self, byte_offset: u64) -> Result<(u64, u64), FeedError> {
        let state = self.state.read().expect("feed lock poisoned");
        if byte_offset > state.byte_len {
            return Err(FeedError::ByteRangeOutOfRange {
                start: byte_offset,
                end: byte_offset,
                byte_len: state.byte_len,
            });
        }
        if byte_offset == state.byte_len {
            return Ok((state.blocks.len() as u64, 0));
        }
        // Last block whose start is <= byte_offset.
        let index = state.starts.partition_point(|&start| start <= byte_offset) - 1;
        Ok((index as u64, byte_offset - state.starts[index]))
    }

    async fn wait_for_len(&self, len: u64) -> Result<(), FeedError> {
        let mut rx = self.length.subscribe();
        let result = rx.wait_for(|(current, closed)| *closed || *current >= len).await;
        match result {
            Ok(value) if value.1 && value.0 < len => Err(FeedError::Closed {
                key: self.key().fmt_short(),
            }),
            Ok(_) => Ok(()),
            // Sender lives inside self, so this only happens on teardown.
            Err(_) => Err(FeedError::Closed {
                key: self.key().fmt_short(),
            }),
        }
    }
}
