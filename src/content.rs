//! Per-trie content feed state.

use std::sync::Arc;

use peerdrive_feed::Feed;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

/// A content feed plus the lock that serializes append sessions on it.
///
/// Every trie (the drive root or a mounted foreign trie) owns at most one
/// `ContentState`. The lock is fair: write sessions queue in acquisition
/// order, and exactly one append session is in flight at a time. Readers
/// never take the lock.
pub struct ContentState {
    feed: Arc<dyn Feed>,
    lock: Arc<Mutex<()>>,
}

impl ContentState {
    /// Wrap a content feed.
    pub fn new(feed: Arc<dyn Feed>) -> Self {
        Self {
            feed,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The content feed.
    pub fn feed(&self) -> &Arc<dyn Feed> {
        &self.feed
    }

    /// Acquire the append lock. The guard is owned so a write session can
    /// hold it across its whole lifetime; dropping the guard releases the
    /// lock unconditionally.
    pub async fn lock(&self) -> OwnedMutexGuard<()> {
        self.lock.clone().lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerdrive_feed::MemoryFeed;

    #[tokio::test]
    async fn lock_serializes_sessions() {
        let state = Arc::new(ContentState::new(Arc::new(MemoryFeed::generate())));
        let guard = state.lock().await;

        let state2 = state.clone();
        let waiter = tokio::spawn(async move {
            let _guard = state2.lock().await;
        });
        // The second session cannot acquire until the first guard drops.
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }
}
