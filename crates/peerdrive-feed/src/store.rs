//! The `FeedStore` backend trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use tracing::debug;

use crate::error::FeedError;
use crate::feed::Feed;
use crate::feed::FeedKey;
use crate::memory::MemoryFeed;

/// Derive the content feed signing key from the metadata feed secret.
///
/// The derivation is deterministic so re-opening the same drive always
/// yields the same content feed, and reproducible across implementations.
pub fn derive_content_keypair(metadata_secret: &[u8; 32]) -> SigningKey {
    let seed = blake3::derive_key("peerdrive content keypair", metadata_secret);
    SigningKey::from_bytes(&seed)
}

/// Storage backend owning the feeds of one or more drives.
///
/// A store hands out at most one feed handle per public key; all callers
/// share it. Replication copies verified blocks between stores.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The store's primary feed, created writable on first call. A drive
    /// opened without an explicit key uses this as its metadata feed.
    async fn default_feed(&self) -> Result<Arc<dyn Feed>, FeedError>;

    /// Acquire the feed for `key`, creating a read-only handle if the store
    /// has not seen the key before.
    async fn feed(&self, key: &FeedKey) -> Result<Arc<dyn Feed>, FeedError>;

    /// Acquire (or create) the writable feed for `signing`'s public key.
    async fn writable_feed(&self, signing: SigningKey) -> Result<Arc<dyn Feed>, FeedError>;

    /// All feeds currently held by the store.
    async fn feeds(&self) -> Vec<Arc<dyn Feed>>;

    /// Pull every feed of `peer` into this store, copying blocks this store
    /// is missing. Returns the number of blocks copied.
    async fn replicate(&self, peer: &dyn FeedStore) -> Result<u64, FeedError>;

    /// Close every feed, attempting all closes and returning the last error
    /// observed, if any.
    async fn close_all(&self) -> Result<(), FeedError>;
}

/// In-memory feed store.
///
/// Clone-able; clones share the same feeds. Two drives opened on one store
/// (or on stores bridged by `replicate`) see each other's feeds, which is
/// how peer sync is modeled in tests and local tooling.
#[derive(Clone, Default)]
pub struct MemoryFeedStore {
    feeds: Arc<Mutex<HashMap<FeedKey, Arc<MemoryFeed>>>>,
    primary: Arc<Mutex<Option<FeedKey>>>,
}

impl MemoryFeedStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn open_memory(&self, key: &FeedKey) -> Result<Arc<MemoryFeed>, FeedError> {
        let mut feeds = self.feeds.lock().expect("store lock poisoned");
        if let Some(feed) = feeds.get(key) {
            return Ok(feed.clone());
        }
        let verifying = VerifyingKey::from_bytes(key.as_bytes()).map_err(|e| FeedError::InvalidKey {
            message: e.to_string(),
        })?;
        let feed = Arc::new(MemoryFeed::observer(verifying));
        feeds.insert(*key, feed.clone());
        debug!(key = %key.fmt_short(), "feed opened read-only");
        Ok(feed)
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn default_feed(&self) -> Result<Arc<dyn Feed>, FeedError> {
        let existing = *self.primary.lock().expect("store lock poisoned");
        if let Some(key) = existing {
            return self.feed(&key).await;
        }
        let feed = Arc::new(MemoryFeed::generate());
        let key = feed.key();
        self.feeds.lock().expect("store lock poisoned").insert(key, feed.clone());
        *self.primary.lock().expect("store lock poisoned") = Some(key);
        debug!(key = %key.fmt_short(), "primary feed created");
        Ok(feed as Arc<dyn Feed>)
    }

    async fn feed(&self, key: &FeedKey) -> Result<Arc<dyn Feed>, FeedError> {
        Ok(self.open_memory(key)? as Arc<dyn Feed>)
    }

    async fn writable_feed(&self, signing: SigningKey) -> Result<Arc<dyn Feed>, FeedError> {
        let key = FeedKey::from(signing.verifying_key());
        let mut feeds = self.feeds.lock().expect("store lock poisoned");
        if let Some(feed) = feeds.get(&key) {
            if feed.writable() {
                return Ok(feed.clone() as Arc<dyn Feed>);
            }
            return Err(FeedError::Storage {
                message: format!("feed {} is already open read-only", key.fmt_short()),
            });
        }
        let feed = Arc::new(MemoryFeed::from_signing_key(signing));
        feeds.insert(key, feed.clone());
        debug!(key = %key.fmt_short(), "writable feed created");
        Ok(feed as Arc<dyn Feed>)
    }

    async fn feeds(&self) -> Vec<Arc<dyn Feed>> {
        let feeds = self.feeds.lock().expect("store lock poisoned");
        feeds.values().map(|f| f.clone() as Arc<dyn Feed>).collect()
    }

    async fn replicate(&self, peer: &dyn FeedStore) -> Result<u64, FeedError> {
        let mut copied = 0u64;
        for remote in peer.feeds().await {
            let local = self.open_memory(&remote.key())?;
            let have = local.len().await;
            let want = remote.len().await;
            let mut blocks = Vec::with_capacity((want.saturating_sub(have)) as usize);
            for index in have..want {
                blocks.push(remote.get(index).await?);
            }
            if !blocks.is_empty() {
                copied += blocks.len() as u64;
                local.extend_verified(blocks)?;
            }
        }
        debug!(blocks = copied, "replication pass complete");
        Ok(copied)
    }

    async fn close_all(&self) -> Result<(), FeedError> {
        let feeds: Vec<_> = self.feeds.lock().expect("store lock poisoned").values().cloned().collect();
        for feed in feeds {
            feed.close();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn default_feed_is_memoized() {
        let store = MemoryFeedStore::new();
        let a = store.default_feed().await.unwrap();
        let b = store.default_feed().await.unwrap();
        assert_eq!(a.key(), b.key());
        assert!(a.writable());
    }

    #[tokio::test]
    async fn content_keypair_derivation_is_deterministic() {
        let secret = [3u8; 32];
        let a = derive_content_keypair(&secret);
        let b = derive_content_keypair(&secret);
        assert_eq!(a.to_bytes(), b.to_bytes());
        // Derived key differs from the metadata key itself.
        assert_ne!(a.verifying_key().to_bytes(), SigningKey::from_bytes(&secret).verifying_key().to_bytes());
    }

    #[tokio::test]
    async fn replicate_copies_missing_blocks() {
        let source = MemoryFeedStore::new();
        let feed = source.default_feed().await.unwrap();
        feed.append(vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]).await.unwrap();

        let sink = MemoryFeedStore::new();
        let copied = sink.replicate(&source).await.unwrap();
        assert_eq!(copied, 2);

        let mirror = sink.feed(&feed.key()).await.unwrap();
        assert_eq!(mirror.len().await, 2);
        assert_eq!(mirror.get(0).await.unwrap(), Bytes::from_static(b"one"));
        assert!(!mirror.writable());

        // A second pass copies nothing new.
        assert_eq!(sink.replicate(&source).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_all_closes_every_feed() {
        let store = MemoryFeedStore::new();
        let feed = store.default_feed().await.unwrap();
        store.close_all().await.unwrap();
        assert!(matches!(feed.get(0).await, Err(FeedError::Closed { .. })));
    }
}
