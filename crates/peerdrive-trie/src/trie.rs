//! The trie proper: op-log persistence, mounts, checkouts, watch.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::RwLock as SyncRwLock;

use bytes::Bytes;
use peerdrive_feed::Feed;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;
use tracing::trace;

use crate::error::TrieError;
use crate::header::decode_header;
use crate::header::encode_header;
use crate::node::TrieNode;
use crate::op::TrieOp;

/// Capacity of the change broadcast channel. Lagged watchers drop
/// notifications rather than block writers.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

const _: () = assert!(CHANGE_CHANNEL_CAPACITY > 0);

struct TrieIndex {
    entries: BTreeMap<String, TrieNode>,
    /// Feed length already applied to `entries` (header included).
    applied: u64,
}

struct MountPoint {
    path: String,
    trie: Arc<Trie>,
}

/// A prefix-indexed key→value trie persisted into an append-only feed.
///
/// Keys are normalized slash-separated paths without a leading slash; the
/// empty string is the root. Values are opaque blobs.
pub struct Trie {
    feed: Arc<dyn Feed>,
    metadata: Option<Bytes>,
    index: RwLock<TrieIndex>,
    /// Serializes mutations; the feed append and the index update commit
    /// together under this lock.
    write_lock: Mutex<()>,
    mounts: SyncRwLock<Vec<MountPoint>>,
    changes: broadcast::Sender<String>,
    /// Pinned version for historical checkouts; `None` for the live trie.
    checkout_version: Option<u64>,
}

impl Trie {
    /// Initialize a trie on an empty writable feed, writing the header
    /// block with the given metadata, then open it.
    pub async fn create(feed: Arc<dyn Feed>, metadata: Option<&[u8]>) -> Result<Arc<Self>, TrieError> {
        feed.append(vec![Bytes::from(encode_header(metadata))]).await?;
        debug!(key = %feed.key().fmt_short(), "trie header written");
        Self::open(feed).await
    }

    /// Open a trie over a feed that already has (or will receive) a header
    /// block. Blocks until block 0 is available, then replays the op log.
    pub async fn open(feed: Arc<dyn Feed>) -> Result<Arc<Self>, TrieError> {
        feed.wait_for_len(1).await?;
        let header = decode_header(&feed.get(0).await?)?;

        let trie = Arc::new(Self {
            feed,
            metadata: header.metadata.map(Bytes::from),
            index: RwLock::new(TrieIndex {
                entries: BTreeMap::new(),
                applied: 1,
            }),
            write_lock: Mutex::new(()),
            mounts: SyncRwLock::new(Vec::new()),
            changes: broadcast::Sender::new(CHANGE_CHANNEL_CAPACITY),
            checkout_version: None,
        });
        trie.refresh().await?;
        Ok(trie)
    }

    /// The backing feed.
    pub fn feed(&self) -> &Arc<dyn Feed> {
        &self.feed
    }

    /// Header metadata (the content feed public key for drive tries).
    pub fn metadata(&self) -> Option<&Bytes> {
        self.metadata.as_ref()
    }

    /// Current version: the feed length, or the pinned version of a
    /// checkout. An empty trie has version 1 (its header block).
    pub async fn version(&self) -> u64 {
        match self.checkout_version {
            Some(version) => version,
            None => self.feed.len().await,
        }
    }

    /// Whether this trie is a historical checkout.
    pub fn is_checkout(&self) -> bool {
        self.checkout_version.is_some()
    }

    /// Apply ops appended to the feed since the last refresh (replication
    /// catching up). No-op on checkouts.
    async fn refresh(&self) -> Result<(), TrieError> {
        if self.checkout_version.is_some() {
            return Ok(());
        }
        let len = self.feed.len().await;
        {
            let index = self.index.read().await;
            if index.applied >= len {
                return Ok(());
            }
        }
        let mut index = self.index.write().await;
        while index.applied < len {
            let seq = index.applied;
            let block = self.feed.get(seq).await?;
            apply_op(&mut index.entries, seq, &block)?;
            index.applied = seq + 1;
        }
        Ok(())
    }

    /// Resolve `key` through mount attachments: returns the owning trie,
    /// the key relative to it, and the consumed mount prefix.
    fn resolve(self: &Arc<Self>, key: &str) -> (Arc<Trie>, String, String) {
        let mut owner = self.clone();
        let mut rest = key.to_string();
        let mut consumed = String::new();
        loop {
            let next = {
                let mounts = owner.mounts.read().expect("mount lock poisoned");
                mounts
                    .iter()
                    .filter(|m| rest.starts_with(&m.path) && rest.as_bytes().get(m.path.len()) == Some(&b'/'))
                    .max_by_key(|m| m.path.len())
                    .map(|m| (m.path.clone(), m.trie.clone()))
            };
            match next {
                Some((path, trie)) => {
                    rest = rest[path.len() + 1..].to_string();
                    consumed = join(&consumed, &path);
                    owner = trie;
                }
                None => break,
            }
        }
        (owner, rest, consumed)
    }

    /// Point lookup. Returns the node (re-keyed to the full path) and the
    /// trie that owns it, which may be a mounted foreign trie.
    pub async fn get(self: &Arc<Self>, key: &str) -> Result<(Option<TrieNode>, Arc<Trie>), TrieError> {
        let (owner, rest, consumed) = self.resolve(key);
        owner.refresh().await?;
        let index = owner.index.read().await;
        let node = index.entries.get(&rest).cloned().map(|mut node| {
            node.key = join(&consumed, &node.key);
            node
        });
        drop(index);
        Ok((node, owner))
    }

    /// Insert or overwrite `key`. Returns the op's feed block index.
    pub async fn put(self: &Arc<Self>, key: &str, value: Bytes) -> Result<u64, TrieError> {
        let (owner, rest, _) = self.resolve(key);
        owner.mutate(rest, Some(value), false).await.map(|seq| seq.expect("unconditional put always writes"))
    }

    /// Insert `key` only if absent. Returns `None` when the key already
    /// exists (the compare-and-swap used for mkdir/symlink uniqueness).
    pub async fn put_if_absent(self: &Arc<Self>, key: &str, value: Bytes) -> Result<Option<u64>, TrieError> {
        let (owner, rest, _) = self.resolve(key);
        owner.mutate(rest, Some(value), true).await
    }

    /// Remove `key`. Returns false if the key was absent.
    pub async fn delete(self: &Arc<Self>, key: &str) -> Result<bool, TrieError> {
        let (owner, rest, _) = self.resolve(key);
        Ok(owner.mutate(rest, None, false).await?.is_some())
    }

    /// Shared mutation path: op encode, feed append, index update, change
    /// notification, all under the write lock.
    async fn mutate(&self, key: String, value: Option<Bytes>, only_if_absent: bool) -> Result<Option<u64>, TrieError> {
        let _guard = self.write_lock.lock().await;
        if let Some(version) = self.checkout_version {
            return Err(TrieError::CheckoutReadOnly { version });
        }
        self.refresh().await?;

        let op = match &value {
            Some(v) => {
                if only_if_absent {
                    let index = self.index.read().await;
                    if index.entries.contains_key(&key) {
                        return Ok(None);
                    }
                }
                TrieOp::Put {
                    key: key.clone(),
                    value: v.to_vec(),
                }
            }
            None => {
                let index = self.index.read().await;
                if !index.entries.contains_key(&key) {
                    return Ok(None);
                }
                drop(index);
                TrieOp::Delete { key: key.clone() }
            }
        };

        let block = postcard::to_allocvec(&op).map_err(|e| TrieError::OpDecode {
            seq: 0,
            message: e.to_string(),
        })?;
        let seq = self.feed.append(vec![Bytes::from(block)]).await?;

        let mut index = self.index.write().await;
        match value {
            Some(value) => {
                index.entries.insert(key.clone(), TrieNode {
                    key: key.clone(),
                    seq,
                    value,
                });
            }
            None => {
                index.entries.remove(&key);
            }
        }
        index.applied = seq + 1;
        drop(index);

        trace!(key = %key, seq, "trie mutated");
        let _ = self.changes.send(key);
        Ok(Some(seq))
    }

    /// All entries strictly under `prefix` (the prefix node itself is
    /// excluded), descending into mounted tries. Keys are full paths from
    /// this trie's root.
    pub async fn list(self: &Arc<Self>, prefix: &str) -> Result<Vec<TrieNode>, TrieError> {
        let (owner, rest, consumed) = self.resolve(prefix);
        let mut out = Vec::new();
        let mut work = vec![(owner, consumed, rest)];
        while let Some((trie, base, prefix)) = work.pop() {
            trie.refresh().await?;
            {
                let index = trie.index.read().await;
                if prefix.is_empty() {
                    for (key, node) in index.entries.iter() {
                        let mut node = node.clone();
                        node.key = join(&base, key);
                        out.push(node);
                    }
                } else {
                    // Keys under the prefix are contiguous from "<prefix>/".
                    let start = format!("{prefix}/");
                    for (key, node) in index.entries.range::<String, _>((Bound::Included(start.clone()), Bound::Unbounded)) {
                        if !key.starts_with(&start) {
                            break;
                        }
                        let mut node = node.clone();
                        node.key = join(&base, key);
                        out.push(node);
                    }
                }
            }
            let nested = {
                let mounts = trie.mounts.read().expect("mount lock poisoned");
                mounts
                    .iter()
                    .filter(|m| prefix.is_empty() || m.path == prefix || under(&prefix, &m.path))
                    .map(|m| (m.trie.clone(), join(&base, &m.path), String::new()))
                    .collect::<Vec<_>>()
            };
            work.extend(nested);
        }
        Ok(out)
    }

    /// Attach `trie` at `path`. Lookups strictly under `path` delegate to
    /// it; the entry at `path` itself stays in this trie.
    pub fn mount(&self, path: &str, trie: Arc<Trie>) -> Result<(), TrieError> {
        if path.is_empty() {
            return Err(TrieError::InvalidMount {
                message: "cannot mount at the trie root".into(),
            });
        }
        let mut mounts = self.mounts.write().expect("mount lock poisoned");
        mounts.retain(|m| m.path != path);
        mounts.push(MountPoint {
            path: path.to_string(),
            trie,
        });
        debug!(path, "trie mounted");
        Ok(())
    }

    /// Detach the mount at `path`. Returns false if none was attached.
    pub fn unmount(&self, path: &str) -> bool {
        let mut mounts = self.mounts.write().expect("mount lock poisoned");
        let before = mounts.len();
        mounts.retain(|m| m.path != path);
        before != mounts.len()
    }

    /// Historical view of this trie at `version`, built by replaying the
    /// op-log prefix. Checkouts are read-only; mount attachments are
    /// carried over from the live trie.
    pub async fn checkout(self: &Arc<Self>, version: u64) -> Result<Arc<Trie>, TrieError> {
        if version < 1 {
            return Err(TrieError::VersionBeforeHeader { version });
        }
        let current = self.feed.len().await;
        if version > current {
            return Err(TrieError::VersionAhead { version, current });
        }

        let mut entries = BTreeMap::new();
        for seq in 1..version {
            let block = self.feed.get(seq).await?;
            apply_op(&mut entries, seq, &block)?;
        }

        let mounts = {
            let mounts = self.mounts.read().expect("mount lock poisoned");
            mounts
                .iter()
                .map(|m| MountPoint {
                    path: m.path.clone(),
                    trie: m.trie.clone(),
                })
                .collect()
        };

        Ok(Arc::new(Self {
            feed: self.feed.clone(),
            metadata: self.metadata.clone(),
            index: RwLock::new(TrieIndex {
                entries,
                applied: version,
            }),
            write_lock: Mutex::new(()),
            mounts: SyncRwLock::new(mounts),
            changes: broadcast::Sender::new(CHANGE_CHANNEL_CAPACITY),
            checkout_version: Some(version),
        }))
    }

    /// Subscribe to mutations under `prefix` (every key for the empty
    /// prefix). Notifications carry the mutated key; no deduplication.
    pub fn watch(&self, prefix: &str) -> TrieWatcher {
        TrieWatcher {
            rx: self.changes.subscribe(),
            prefix: prefix.to_string(),
        }
    }
}

/// A subscription to trie mutations under one prefix.
pub struct TrieWatcher {
    rx: broadcast::Receiver<String>,
    prefix: String,
}

impl TrieWatcher {
    /// The next mutated key under the watched prefix, or `None` once the
    /// trie is gone. Lagged notifications are skipped.
    pub async fn changed(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(key) if self.prefix.is_empty() || key == self.prefix || under(&self.prefix, &key) => {
                    return Some(key);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

fn apply_op(entries: &mut BTreeMap<String, TrieNode>, seq: u64, block: &[u8]) -> Result<(), TrieError> {
    let op: TrieOp = postcard::from_bytes(block).map_err(|e| TrieError::OpDecode {
        seq,
        message: e.to_string(),
    })?;
    match op {
        TrieOp::Put { key, value } => {
            entries.insert(key.clone(), TrieNode {
                key,
                seq,
                value: Bytes::from(value),
            });
        }
        TrieOp::Delete { key } => {
            entries.remove(&key);
        }
    }
    Ok(())
}

fn under(prefix: &str, key: &str) -> bool {
    key.len() > prefix.len() + 1 && key.starts_with(prefix) && key.as_bytes()[prefix.len()] == b'/'
}

fn join(base: &str, key: &str) -> String {
    match (base.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{key}"),
    }
}
