//! File descriptor state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;
use std::sync::atomic::AtomicU64;

use peerdrive_feed::Feed;
use peerdrive_feed::read_range;

use crate::error::DriveError;
use crate::stream::AppendSession;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Positioned reads over the file's content range.
    Read,
    /// An append session; the descriptor holds the content lock until
    /// closed and commits its stat on close.
    Write,
}

/// A read descriptor: a cursor over the file's byte range in a feed.
pub(crate) struct ReadFd {
    feed: Arc<dyn Feed>,
    /// Absolute feed byte index of the file's first byte.
    base: u64,
    /// File size at open time.
    size: u64,
    pos: u64,
}

impl ReadFd {
    pub(crate) fn new(feed: Arc<dyn Feed>, base: u64, size: u64) -> Self {
        Self {
            feed,
            base,
            size,
            pos: 0,
        }
    }

    /// Read into `buf` at `pos`, or at the internal cursor when `pos` is
    /// `None` (advancing it). Returns the bytes read; 0 at or past EOF.
    pub(crate) async fn read(&mut self, buf: &mut [u8], pos: Option<u64>) -> Result<usize, DriveError> {
        let at = pos.unwrap_or(self.pos);
        if at >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let take = (buf.len() as u64).min(self.size - at);
        let bytes = read_range(self.feed.as_ref(), self.base + at, take).await?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        if pos.is_none() {
            self.pos = at + bytes.len() as u64;
        }
        Ok(bytes.len())
    }
}

/// A write descriptor: an append session plus its registration in the
/// drive's writing map (consulted by lstat for in-flight sizes).
pub(crate) struct WriteFd {
    pub(crate) session: Option<AppendSession>,
    path: String,
    writing: Arc<SyncMutex<HashMap<String, Arc<AtomicU64>>>>,
}

impl WriteFd {
    pub(crate) fn new(
        session: AppendSession,
        path: String,
        writing: Arc<SyncMutex<HashMap<String, Arc<AtomicU64>>>>,
    ) -> Self {
        Self {
            session: Some(session),
            path,
            writing,
        }
    }

    pub(crate) async fn write(&mut self, data: &[u8]) -> Result<usize, DriveError> {
        match self.session.as_mut() {
            Some(session) => session.write(data).await,
            None => Err(DriveError::BadFileDescriptor { fd: 0 }),
        }
    }

    /// Commit the stat; called exactly once from close.
    pub(crate) async fn commit(&mut self) -> Result<(), DriveError> {
        if let Some(session) = self.session.take() {
            session.commit().await?;
        }
        Ok(())
    }
}

impl Drop for WriteFd {
    fn drop(&mut self) {
        // Deregister even when the descriptor is dropped uncommitted; the
        // session guard (if still held) releases with it.
        let mut writing = self.writing.lock().expect("writing map lock poisoned");
        writing.remove(&self.path);
    }
}

/// One slot in the drive's descriptor table.
pub(crate) enum FdInner {
    Read(ReadFd),
    Write(WriteFd),
}
