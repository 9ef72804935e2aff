//! Streaming read/write options and the append session shared by write
//! streams and write-mode file descriptors.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use peerdrive_trie::Trie;
use peerdrive_types::Stat;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::constants::WRITE_BLOCK_SIZE;
use crate::content::ContentState;
use crate::error::DriveError;
use crate::events::EventBroadcaster;

/// Options for streaming reads.
#[derive(Debug, Clone, Default)]
pub struct ReadStreamOptions {
    /// First byte of the file to read.
    pub start: u64,
    /// Last byte of the file to read, inclusive.
    pub end: Option<u64>,
    /// Number of bytes to read; takes precedence over `end`.
    pub length: Option<u64>,
}

impl ReadStreamOptions {
    /// Number of bytes the stream should cover for a file of `size` bytes:
    /// `length` if given, else `end + 1 - start` if `end` is given, else
    /// the rest of the file. Clamped to the bytes actually available.
    pub(crate) fn byte_length(&self, size: u64) -> u64 {
        let available = size.saturating_sub(self.start);
        let wanted = match (self.length, self.end) {
            (Some(length), _) => length,
            (None, Some(end)) => (end + 1).saturating_sub(self.start),
            (None, None) => available,
        };
        wanted.min(available)
    }
}

/// Options for writes: permission bits, ownership, timestamps. Unset
/// timestamps default to the commit time.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Permission bits to store (file-type bits are supplied by the drive).
    pub mode: Option<u32>,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Modification time, milliseconds since the epoch.
    pub mtime: Option<u64>,
    /// Creation time, milliseconds since the epoch.
    pub ctime: Option<u64>,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// One in-flight append session on a content feed.
///
/// Holds the content lock for its whole lifetime; the stat is composed and
/// committed on `commit`, never earlier, so a reader that can see the stat
/// can always read the bytes it references.
pub(crate) struct AppendSession {
    name: String,
    root: Arc<Trie>,
    content: Arc<ContentState>,
    guard: Option<OwnedMutexGuard<()>>,
    start_offset: u64,
    start_byte_offset: u64,
    written: u64,
    opts: WriteOptions,
    events: EventBroadcaster,
    /// Published in-flight size for lstat of a path open for writing.
    inflight: Option<Arc<AtomicU64>>,
}

impl AppendSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        root: Arc<Trie>,
        content: Arc<ContentState>,
        guard: OwnedMutexGuard<()>,
        start_offset: u64,
        start_byte_offset: u64,
        opts: WriteOptions,
        events: EventBroadcaster,
        inflight: Option<Arc<AtomicU64>>,
    ) -> Self {
        Self {
            name,
            root,
            content,
            guard: Some(guard),
            start_offset,
            start_byte_offset,
            written: 0,
            opts,
            events,
            inflight,
        }
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    /// Append `data` to the content feed, split at block boundaries.
    pub(crate) async fn write(&mut self, data: &[u8]) -> Result<usize, DriveError> {
        if data.is_empty() {
            return Ok(0);
        }
        let blocks: Vec<Bytes> = data.chunks(WRITE_BLOCK_SIZE).map(Bytes::copy_from_slice).collect();
        self.content.feed().append(blocks).await?;
        self.written += data.len() as u64;
        if let Some(inflight) = &self.inflight {
            inflight.store(self.written, Ordering::Relaxed);
        }
        Ok(data.len())
    }

    /// Compose the file stat from the feed deltas and commit it to the
    /// trie, then release the lock.
    pub(crate) async fn commit(mut self) -> Result<Stat, DriveError> {
        let feed = self.content.feed();
        let size = feed.byte_len().await - self.start_byte_offset;
        let blocks = feed.len().await - self.start_offset;

        let now = now_millis();
        let mut stat = Stat::file(size, blocks, self.start_offset, self.start_byte_offset)
            .with_owner(self.opts.uid, self.opts.gid)
            .with_times(self.opts.mtime.unwrap_or(now), self.opts.ctime.unwrap_or(now));
        if let Some(mode) = self.opts.mode {
            stat = stat.with_mode(mode);
        }

        self.root.put(&self.name, Bytes::from(stat.encode())).await?;
        debug!(name = %self.name, size, blocks, "append committed");
        self.events.emit_update(self.root.version().await);
        self.events.emit_append(&self.name);
        self.guard.take();
        Ok(stat)
    }
}

/// A streaming write session on one path.
///
/// Obtained from [`crate::Drive::write_stream`]. Bytes passed to `write`
/// are appended to the content feed immediately; the stat referencing them
/// is committed by `finish`. Dropping the stream without finishing releases
/// the content lock but does not roll back bytes already appended: the
/// entry keeps its previous stat and the orphaned bytes stay in the feed.
pub struct WriteStream {
    session: AppendSession,
}

impl WriteStream {
    pub(crate) fn new(session: AppendSession) -> Self {
        Self { session }
    }

    /// Number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.session.written()
    }

    /// Append a chunk of file contents.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, DriveError> {
        self.session.write(data).await
    }

    /// Commit the file stat and release the content lock.
    pub async fn finish(self) -> Result<Stat, DriveError> {
        self.session.commit().await
    }
}
