//! The drive: filesystem semantics over a metadata trie and a content feed.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use bytes::BytesMut;
use futures::StreamExt;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use peerdrive_feed::ByteStreamOptions;
use peerdrive_feed::Feed;
use peerdrive_feed::FeedError;
use peerdrive_feed::FeedKey;
use peerdrive_feed::FeedStore;
use peerdrive_feed::SigningKey;
use peerdrive_feed::byte_stream;
use peerdrive_feed::derive_content_keypair;
use peerdrive_trie::Trie;
use peerdrive_trie::TrieWatcher;
use peerdrive_types::Mount;
use peerdrive_types::Stat;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use crate::constants::STDIO_CAP;
use crate::content::ContentState;
use crate::error::DriveError;
use crate::events::DriveEvent;
use crate::events::EventBroadcaster;
use crate::fd::FdInner;
use crate::fd::OpenMode;
use crate::fd::ReadFd;
use crate::fd::WriteFd;
use crate::paths::normalize;
use crate::paths::relative;
use crate::paths::resolve_link;
use crate::stream::AppendSession;
use crate::stream::ReadStreamOptions;
use crate::stream::WriteOptions;
use crate::stream::WriteStream;
use crate::stream::now_millis;

/// Options for opening a drive.
#[derive(Debug, Clone, Default)]
pub struct DriveOptions {
    /// Open the drive of this metadata feed key (read-only unless the
    /// store holds the signing key). Ignored when `secret_key` is set.
    pub key: Option<FeedKey>,
    /// Open (or create) the drive with this metadata signing key seed.
    pub secret_key: Option<[u8; 32]>,
}

/// Options for mount attachments.
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    /// Mount the foreign feed as a raw content feed instead of a trie.
    pub hypercore: bool,
}

/// A peer-to-peer versioned filesystem over two feeds.
///
/// The metadata feed carries a prefix-indexed trie of stat records; the
/// content feed carries file payload bytes. A stat is only ever committed
/// after the bytes it references are in the content feed, so any reader
/// that resolves a stat finds its byte range in-range.
pub struct Drive {
    store: Arc<dyn FeedStore>,
    trie: Arc<Trie>,
    /// Content state per trie, keyed by the trie's feed key. Shared with
    /// checkouts; content feeds are append-only so historical block ranges
    /// stay valid.
    contents: Arc<RwLock<HashMap<FeedKey, Arc<ContentState>>>>,
    /// Sparse descriptor table. Slots are never reordered; close nulls a
    /// slot and truncates trailing nulls.
    fds: Mutex<Vec<Option<Arc<Mutex<FdInner>>>>>,
    /// Paths currently open for writing, with their in-flight sizes.
    writing: Arc<SyncMutex<HashMap<String, Arc<AtomicU64>>>>,
    events: EventBroadcaster,
}

impl Drive {
    /// Open (or create) a drive on `store`.
    ///
    /// A writable empty metadata feed is initialized: the content keypair
    /// is derived deterministically from the metadata secret and the
    /// content public key is written into the trie header. A non-empty
    /// feed is restored from its header. Bring-up failures are emitted as
    /// [`DriveEvent::Error`] and returned.
    pub async fn new(store: Arc<dyn FeedStore>, opts: DriveOptions) -> Result<Self, DriveError> {
        let events = EventBroadcaster::new();
        match Self::bring_up(store, opts, events.clone()).await {
            Ok(drive) => {
                info!(key = %drive.key().fmt_short(), writable = drive.writable(), "drive ready");
                Ok(drive)
            }
            Err(e) => {
                events.emit_error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn bring_up(store: Arc<dyn FeedStore>, opts: DriveOptions, events: EventBroadcaster) -> Result<Self, DriveError> {
        let metadata: Arc<dyn Feed> = if let Some(secret) = opts.secret_key {
            store.writable_feed(SigningKey::from_bytes(&secret)).await?
        } else if let Some(key) = opts.key {
            store.feed(&key).await?
        } else {
            store.default_feed().await?
        };

        let trie = if metadata.writable() && metadata.len().await == 0 {
            let secret = metadata.secret_key().ok_or(DriveError::Feed {
                source: FeedError::Storage {
                    message: "writable feed exposes no secret key".into(),
                },
            })?;
            let content_key = FeedKey::from(derive_content_keypair(&secret).verifying_key());
            Trie::create(metadata.clone(), Some(content_key.as_bytes())).await?
        } else {
            Trie::open(metadata.clone()).await?
        };

        let drive = Self {
            store,
            trie,
            contents: Arc::new(RwLock::new(HashMap::new())),
            fds: Mutex::new(Vec::new()),
            writing: Arc::new(SyncMutex::new(HashMap::new())),
            events,
        };

        // Writers acquire their content feed eagerly; read-only drives
        // defer until a stat actually references content.
        if drive.writable() {
            drive.content_state(&drive.trie).await?;
        }
        Ok(drive)
    }

    /// The drive key (the metadata feed's public key).
    pub fn key(&self) -> FeedKey {
        self.trie.feed().key()
    }

    /// Discovery key, safe to announce without revealing the drive key.
    pub fn discovery_key(&self) -> [u8; 32] {
        self.key().discovery_key()
    }

    /// The content feed's public key, once known.
    pub fn content_key(&self) -> Option<FeedKey> {
        self.trie.metadata().and_then(|m| FeedKey::try_from(m.as_ref()).ok())
    }

    /// Whether this drive can write.
    pub fn writable(&self) -> bool {
        self.trie.feed().writable() && !self.trie.is_checkout()
    }

    /// Current drive version (the metadata trie version).
    pub async fn version(&self) -> u64 {
        self.trie.version().await
    }

    /// The backing feed store.
    pub fn store(&self) -> &Arc<dyn FeedStore> {
        &self.store
    }

    /// Subscribe to drive events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriveEvent> {
        self.events.subscribe()
    }

    /// Watch for mutations under `name`. Each trie commit in the subtree
    /// yields the mutated path; no deduplication.
    pub fn watch(&self, name: &str) -> TrieWatcher {
        self.trie.watch(&normalize(name))
    }

    /// Pull both feeds (and any mounted feeds) from a peer store into this
    /// drive's store. Returns the number of blocks copied.
    pub async fn replicate(&self, peer: &dyn FeedStore) -> Result<u64, DriveError> {
        Ok(self.store.replicate(peer).await?)
    }

    /// Close every feed through the backend, attempting all closes and
    /// returning the last error observed.
    pub async fn close_all(&self) -> Result<(), DriveError> {
        Ok(self.store.close_all().await?)
    }

    // ------------------------------------------------------------------
    // Content state
    // ------------------------------------------------------------------

    /// The content state of `trie`, acquired lazily and cached per trie.
    ///
    /// Writable when the content secret is derivable from the trie's own
    /// feed secret; otherwise read-only, waiting for the first block so
    /// length and byte length reflect reality.
    async fn content_state(&self, trie: &Arc<Trie>) -> Result<Arc<ContentState>, DriveError> {
        let trie_key = trie.feed().key();
        {
            let map = self.contents.read().await;
            if let Some(state) = map.get(&trie_key) {
                return Ok(state.clone());
            }
        }

        let meta = trie.metadata().ok_or(DriveError::MissingContentKey)?;
        let content_key = FeedKey::try_from(meta.as_ref())?;

        let derived = trie.feed().secret_key().map(|secret| derive_content_keypair(&secret));
        let feed = match derived {
            Some(signing) if FeedKey::from(signing.verifying_key()) == content_key => {
                self.store.writable_feed(signing).await?
            }
            _ => {
                let feed = self.store.feed(&content_key).await?;
                if feed.len().await == 0 {
                    feed.wait_for_len(1).await?;
                }
                feed
            }
        };
        debug!(trie = %trie_key.fmt_short(), content = %content_key.fmt_short(), writable = feed.writable(), "content feed acquired");

        let state = Arc::new(ContentState::new(feed));
        let mut map = self.contents.write().await;
        Ok(map.entry(trie_key).or_insert(state).clone())
    }

    // ------------------------------------------------------------------
    // Stat
    // ------------------------------------------------------------------

    /// Raw trie lookup: the decoded stat (if any) and the owning trie.
    /// In-flight sizes of paths open for writing are substituted.
    async fn entry(&self, name: &str) -> Result<(Option<Stat>, Arc<Trie>), DriveError> {
        let (node, owner) = self.trie.get(name).await?;
        match node {
            Some(node) => {
                let mut stat = Stat::decode(&node.value).map_err(|source| DriveError::Decode {
                    path: name.to_string(),
                    source,
                })?;
                if let Some(size) = self.inflight_size(name) {
                    stat.set_size(size);
                }
                Ok((Some(stat), owner))
            }
            None => Ok((None, owner)),
        }
    }

    fn inflight_size(&self, name: &str) -> Option<u64> {
        let writing = self.writing.lock().expect("writing map lock poisoned");
        writing.get(name).map(|size| size.load(Ordering::Relaxed))
    }

    /// Stat without following symlinks.
    #[instrument(skip(self))]
    pub async fn lstat(&self, name: &str) -> Result<Stat, DriveError> {
        self.lstat_normalized(&normalize(name)).await
    }

    /// Stat, following one level of symlink.
    #[instrument(skip(self))]
    pub async fn stat(&self, name: &str) -> Result<Stat, DriveError> {
        let name = normalize(name);
        let stat = self.lstat_normalized(&name).await?;
        match stat.linkname() {
            Some(linkname) => {
                let target = resolve_link(linkname, &name);
                self.lstat_normalized(&target).await
            }
            None => Ok(stat),
        }
    }

    async fn lstat_normalized(&self, name: &str) -> Result<Stat, DriveError> {
        let (stat, _) = self.entry(name).await?;
        match stat {
            Some(stat) => Ok(stat),
            None => self.stat_directory(name).await,
        }
    }

    /// Directory probe: a path with no node of its own is a directory iff
    /// it has children (the root always is one).
    async fn stat_directory(&self, name: &str) -> Result<Stat, DriveError> {
        if !name.is_empty() && self.trie.list(name).await?.is_empty() {
            return Err(DriveError::FileNotFound {
                path: name.to_string(),
            });
        }
        Ok(Stat::directory())
    }

    /// Whether `name` resolves to any entry (including implicit
    /// directories).
    pub async fn exists(&self, name: &str) -> Result<bool, DriveError> {
        match self.lstat(name).await {
            Ok(_) => Ok(true),
            Err(e) if e.errno() == Some(2) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The target of the symlink at `name`, unresolved.
    pub async fn readlink(&self, name: &str) -> Result<String, DriveError> {
        let stat = self.lstat(name).await?;
        stat.linkname().map(String::from).ok_or_else(|| DriveError::NotASymlink {
            path: normalize(name),
        })
    }

    /// Resolve `name` to a file stat, following one symlink level.
    async fn resolve_file(&self, name: &str) -> Result<(Stat, Arc<Trie>, String), DriveError> {
        let (stat, owner) = self.entry(name).await?;
        let stat = stat.ok_or_else(|| DriveError::FileNotFound {
            path: name.to_string(),
        })?;
        if let Some(linkname) = stat.linkname() {
            let target = resolve_link(linkname, name);
            let (stat, owner) = self.entry(&target).await?;
            let stat = stat.ok_or_else(|| DriveError::FileNotFound { path: target.clone() })?;
            return Ok((stat, owner, target));
        }
        Ok((stat, owner, name.to_string()))
    }

    // ------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------

    /// Open `path` and return a descriptor number (always >= `STDIO_CAP`).
    ///
    /// Read descriptors follow one symlink level and may target raw feed
    /// mounts. A write descriptor holds the content lock from open to
    /// close and commits its stat on close.
    #[instrument(skip(self))]
    pub async fn open(&self, path: &str, mode: OpenMode) -> Result<u64, DriveError> {
        let name = normalize(path);
        let inner = match mode {
            OpenMode::Read => {
                let (stat, owner, resolved) = self.resolve_file(&name).await?;
                if stat.is_directory() {
                    return Err(DriveError::IsADirectory { path: resolved });
                }
                if stat.is_symlink() {
                    return Err(DriveError::FileNotFound { path: resolved });
                }
                let (feed, base) = match stat.hypercore_mount() {
                    Some(mount) => (self.store.feed(&FeedKey::from_bytes(mount.key)).await?, 0),
                    None => {
                        let content = self.content_state(&owner).await?;
                        (content.feed().clone(), stat.byte_offset())
                    }
                };
                FdInner::Read(ReadFd::new(feed, base, stat.size()))
            }
            OpenMode::Write => {
                let inflight = Arc::new(AtomicU64::new(0));
                let session = self.begin_append(&name, WriteOptions::default(), Some(inflight.clone())).await?;
                self.writing.lock().expect("writing map lock poisoned").insert(name.clone(), inflight);
                FdInner::Write(WriteFd::new(session, name.clone(), self.writing.clone()))
            }
        };

        let mut fds = self.fds.lock().await;
        let idx = match fds.iter().position(|slot| slot.is_none()) {
            Some(idx) => idx,
            None => {
                fds.push(None);
                fds.len() - 1
            }
        };
        fds[idx] = Some(Arc::new(Mutex::new(inner)));
        Ok(idx as u64 + STDIO_CAP)
    }

    async fn descriptor(&self, fd: u64) -> Result<Arc<Mutex<FdInner>>, DriveError> {
        let idx = fd.checked_sub(STDIO_CAP).ok_or(DriveError::BadFileDescriptor { fd })? as usize;
        let fds = self.fds.lock().await;
        fds.get(idx).and_then(Clone::clone).ok_or(DriveError::BadFileDescriptor { fd })
    }

    /// Read from descriptor `fd` into `buf` at `pos`, or at the
    /// descriptor's cursor (advancing it) when `pos` is `None`. Returns the
    /// bytes read; short reads at EOF, 0 past EOF.
    pub async fn read(&self, fd: u64, buf: &mut [u8], pos: Option<u64>) -> Result<usize, DriveError> {
        let desc = self.descriptor(fd).await?;
        let mut inner = desc.lock().await;
        match &mut *inner {
            FdInner::Read(read_fd) => read_fd.read(buf, pos).await,
            FdInner::Write(_) => Err(DriveError::BadFileDescriptor { fd }),
        }
    }

    /// Append `data` through write descriptor `fd`.
    pub async fn write(&self, fd: u64, data: &[u8]) -> Result<usize, DriveError> {
        let desc = self.descriptor(fd).await?;
        let mut inner = desc.lock().await;
        match &mut *inner {
            FdInner::Write(write_fd) => write_fd.write(data).await,
            FdInner::Read(_) => Err(DriveError::BadFileDescriptor { fd }),
        }
    }

    /// Close descriptor `fd`. Write descriptors commit their stat here.
    pub async fn close(&self, fd: u64) -> Result<(), DriveError> {
        let idx = fd.checked_sub(STDIO_CAP).ok_or(DriveError::BadFileDescriptor { fd })? as usize;
        let desc = {
            let mut fds = self.fds.lock().await;
            let desc = fds
                .get_mut(idx)
                .and_then(Option::take)
                .ok_or(DriveError::BadFileDescriptor { fd })?;
            while fds.last().is_some_and(Option::is_none) {
                fds.pop();
            }
            desc
        };
        let mut inner = desc.lock().await;
        if let FdInner::Write(write_fd) = &mut *inner {
            write_fd.commit().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    /// Stream the contents of `name` as a sequence of chunks.
    ///
    /// Raw feed mounts stream the whole foreign feed; `start`/`end`
    /// options apply to regular files.
    #[instrument(skip(self, opts))]
    pub async fn read_stream(
        &self,
        name: &str,
        opts: ReadStreamOptions,
    ) -> Result<BoxStream<'static, Result<Bytes, DriveError>>, DriveError> {
        let name = normalize(name);
        let (stat, owner, resolved) = self.resolve_file(&name).await?;
        if stat.is_directory() {
            return Err(DriveError::IsADirectory { path: resolved });
        }
        if stat.is_symlink() {
            return Err(DriveError::FileNotFound { path: resolved });
        }

        let stream = match stat.hypercore_mount() {
            Some(mount) => {
                let feed = self.store.feed(&FeedKey::from_bytes(mount.key)).await?;
                byte_stream(feed, ByteStreamOptions {
                    block_offset: 0,
                    byte_offset: 0,
                    byte_length: opts.byte_length(stat.size()),
                    block_length: Some(stat.blocks()),
                })
            }
            None => {
                let content = self.content_state(&owner).await?;
                byte_stream(content.feed().clone(), ByteStreamOptions {
                    block_offset: stat.offset(),
                    byte_offset: stat.byte_offset() + opts.start,
                    byte_length: opts.byte_length(stat.size()),
                    block_length: None,
                })
            }
        };
        Ok(stream.map_err(DriveError::from).boxed())
    }

    /// Begin a write session on `name`: resolve the owning trie, take its
    /// content lock, snapshot the feed lengths, and announce the append.
    pub(crate) async fn begin_append(
        &self,
        name: &str,
        opts: WriteOptions,
        inflight: Option<Arc<AtomicU64>>,
    ) -> Result<AppendSession, DriveError> {
        let (_, owner) = self.entry(name).await?;
        let content = self.content_state(&owner).await?;
        let guard = content.lock().await;
        let start_offset = content.feed().len().await;
        let start_byte_offset = content.feed().byte_len().await;
        self.events.emit_appending(name);
        Ok(AppendSession::new(
            name.to_string(),
            self.trie.clone(),
            content,
            guard,
            start_offset,
            start_byte_offset,
            opts,
            self.events.clone(),
            inflight,
        ))
    }

    /// Open a streaming write session on `name`.
    #[instrument(skip(self, opts))]
    pub async fn write_stream(&self, name: &str, opts: WriteOptions) -> Result<WriteStream, DriveError> {
        let name = normalize(name);
        Ok(WriteStream::new(self.begin_append(&name, opts, None).await?))
    }

    // ------------------------------------------------------------------
    // Whole-file operations
    // ------------------------------------------------------------------

    /// Write `data` as the new contents of `name`.
    #[instrument(skip(self, data, opts), fields(len = data.len()))]
    pub async fn write_file(&self, name: &str, data: &[u8], opts: WriteOptions) -> Result<Stat, DriveError> {
        let mut stream = self.write_stream(name, opts).await?;
        stream.write(data).await?;
        stream.finish().await
    }

    /// Read the whole contents of `name`.
    #[instrument(skip(self))]
    pub async fn read_file(&self, name: &str) -> Result<Bytes, DriveError> {
        let mut stream = self.read_stream(name, ReadStreamOptions::default()).await?;
        let mut out = BytesMut::new();
        while let Some(chunk) = stream.try_next().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// Read the whole contents of `name` as UTF-8 text.
    pub async fn read_file_string(&self, name: &str) -> Result<String, DriveError> {
        let bytes = self.read_file(name).await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DriveError::NotUtf8 {
            path: normalize(name),
        })
    }

    /// Ensure a file exists at `name`: return the existing stat, or commit
    /// an empty file stat at the current end of the content feed.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str) -> Result<Stat, DriveError> {
        let name = normalize(name);
        let (existing, owner) = self.entry(&name).await?;
        if let Some(stat) = existing {
            if stat.is_file() {
                return Ok(stat);
            }
        }

        let content = self.content_state(&owner).await?;
        let _guard = content.lock().await;
        let now = now_millis();
        let stat = Stat::file(0, 0, content.feed().len().await, content.feed().byte_len().await).with_times(now, now);
        self.trie.put(&name, Bytes::from(stat.encode())).await?;
        self.note_update().await;
        Ok(stat)
    }

    /// Truncate (or extend with zero bytes) the file at `name` to `size`.
    ///
    /// The content feed is append-only, so both directions rewrite: a
    /// shrink re-writes the surviving prefix, a grow re-writes the contents
    /// plus zero padding.
    #[instrument(skip(self))]
    pub async fn truncate(&self, name: &str, size: u64) -> Result<(), DriveError> {
        let name = normalize(name);
        let (stat, _) = self.entry(&name).await?;
        let stat = match stat {
            Some(stat) if stat.is_file() => stat,
            _ => self.create(&name).await?,
        };
        let current = stat.size();
        if size == current {
            return Ok(());
        }

        let opts = WriteOptions {
            mode: Some(stat.mode),
            uid: stat.uid,
            gid: stat.gid,
            ..Default::default()
        };
        let keep = size.min(current);
        let mut data = Vec::with_capacity(size as usize);
        if keep > 0 {
            let mut stream = self
                .read_stream(&name, ReadStreamOptions {
                    length: Some(keep),
                    ..Default::default()
                })
                .await?;
            while let Some(chunk) = stream.try_next().await? {
                data.extend_from_slice(&chunk);
            }
        }
        data.resize(size as usize, 0);
        self.write_file(&name, &data, opts).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Directories and links
    // ------------------------------------------------------------------

    /// Create the directory `name`. Fails with `PathAlreadyExists` if the
    /// entry exists (conditional put).
    #[instrument(skip(self))]
    pub async fn mkdir(&self, name: &str) -> Result<(), DriveError> {
        let name = normalize(name);
        if name.is_empty() {
            return Err(DriveError::PathAlreadyExists { path: "/".into() });
        }
        let now = now_millis();
        let stat = Stat::directory().with_times(now, now);
        match self.trie.put_if_absent(&name, Bytes::from(stat.encode())).await? {
            Some(_) => {
                self.note_update().await;
                Ok(())
            }
            None => Err(DriveError::PathAlreadyExists { path: name }),
        }
    }

    /// List the entries under `name`. Non-recursive listings project each
    /// entry to its first path segment and deduplicate; recursive listings
    /// return full paths relative to `name`.
    #[instrument(skip(self))]
    pub async fn readdir(&self, name: &str, recursive: bool) -> Result<Vec<String>, DriveError> {
        let prefix = normalize(name);
        let nodes = self.trie.list(&prefix).await?;
        if recursive {
            return Ok(nodes.into_iter().map(|n| relative(&prefix, &n.key).to_string()).collect());
        }
        let segments: BTreeSet<String> = nodes
            .iter()
            .map(|n| crate::paths::first_segment(&prefix, &n.key).to_string())
            .collect();
        Ok(segments.into_iter().collect())
    }

    /// Remove the file entry at `name`.
    #[instrument(skip(self))]
    pub async fn unlink(&self, name: &str) -> Result<(), DriveError> {
        let name = normalize(name);
        if !self.trie.delete(&name).await? {
            return Err(DriveError::FileNotFound { path: name });
        }
        self.note_update().await;
        Ok(())
    }

    /// Remove the directory at `name`; fails with `DirectoryNotEmpty` if
    /// any child exists. Implicit directories (no entry of their own) are
    /// already gone once their last child is, so a missing entry is fine.
    #[instrument(skip(self))]
    pub async fn rmdir(&self, name: &str) -> Result<(), DriveError> {
        let name = normalize(name);
        if !self.trie.list(&name).await?.is_empty() {
            return Err(DriveError::DirectoryNotEmpty { path: name });
        }
        if self.trie.delete(&name).await? {
            self.note_update().await;
        }
        Ok(())
    }

    /// Create a symlink at `link_name` pointing to `target`. The target is
    /// stored verbatim and resolved at stat-time.
    #[instrument(skip(self))]
    pub async fn symlink(&self, target: &str, link_name: &str) -> Result<(), DriveError> {
        let name = normalize(link_name);
        match self.lstat(link_name).await {
            Ok(_) => return Err(DriveError::PathAlreadyExists { path: name }),
            Err(e) if e.errno() == Some(2) => {}
            Err(e) => return Err(e),
        }
        let now = now_millis();
        let stat = Stat::symlink(target).with_times(now, now);
        match self.trie.put_if_absent(&name, Bytes::from(stat.encode())).await? {
            Some(_) => {
                self.note_update().await;
                Ok(())
            }
            None => Err(DriveError::PathAlreadyExists { path: name }),
        }
    }

    // ------------------------------------------------------------------
    // Mounts and checkouts
    // ------------------------------------------------------------------

    /// Mount the foreign feed `key` at `path`: a raw content feed when
    /// `opts.hypercore` is set (reads at `path` stream the whole feed), a
    /// trie mount otherwise (the subtree is served by the foreign trie).
    #[instrument(skip(self, opts))]
    pub async fn mount(&self, path: &str, key: FeedKey, opts: MountOptions) -> Result<(), DriveError> {
        let name = normalize(path);
        if name.is_empty() {
            return Err(DriveError::PathAlreadyExists { path: "/".into() });
        }
        let now = now_millis();
        if opts.hypercore {
            let feed = self.store.feed(&key).await?;
            let stat = Stat::file(feed.byte_len().await, feed.len().await, 0, 0)
                .with_mount(Mount::hypercore(*key.as_bytes()))
                .with_times(now, now);
            self.trie.put(&name, Bytes::from(stat.encode())).await?;
        } else {
            let feed = self.store.feed(&key).await?;
            let foreign = Trie::open(feed).await?;
            let stat = Stat::directory().with_mount(Mount::trie(*key.as_bytes())).with_times(now, now);
            self.trie.put(&name, Bytes::from(stat.encode())).await?;
            self.trie.mount(&name, foreign)?;
        }
        info!(path = %name, key = %key.fmt_short(), hypercore = opts.hypercore, "mounted");
        self.note_update().await;
        Ok(())
    }

    /// Detach the mount at `path` and remove its entry.
    #[instrument(skip(self))]
    pub async fn unmount(&self, path: &str) -> Result<(), DriveError> {
        let name = normalize(path);
        self.trie.unmount(&name);
        if !self.trie.delete(&name).await? {
            return Err(DriveError::FileNotFound { path: name });
        }
        self.note_update().await;
        Ok(())
    }

    /// A read-only view of this drive at a historical `version`. Shares
    /// the store and content states; the metadata trie is replaced by its
    /// checkout.
    #[instrument(skip(self))]
    pub async fn checkout(&self, version: u64) -> Result<Drive, DriveError> {
        let trie = self.trie.checkout(version).await?;
        Ok(Drive {
            store: self.store.clone(),
            trie,
            contents: self.contents.clone(),
            fds: Mutex::new(Vec::new()),
            writing: Arc::new(SyncMutex::new(HashMap::new())),
            events: EventBroadcaster::new(),
        })
    }

    async fn note_update(&self) {
        self.events.emit_update(self.trie.version().await);
    }
}
