//! Byte-range streaming over block-addressed feeds.

use std::sync::Arc;

use bytes::Bytes;
use bytes::BytesMut;
use futures::stream::BoxStream;
use futures::stream::try_unfold;

use crate::error::FeedError;
use crate::feed::Feed;

/// Default read-ahead watermark for streaming reads (64 KiB). Chunks larger
/// than this are split before being yielded.
pub const READ_STREAM_HIGH_WATER_MARK: usize = 64 * 1024;

const _: () = assert!(READ_STREAM_HIGH_WATER_MARK > 0);

/// Parameters of a byte-range stream.
#[derive(Debug, Clone, Default)]
pub struct ByteStreamOptions {
    /// Hint: index of the first block covering the range. The stream seeks
    /// the exact block from `byte_offset`.
    pub block_offset: u64,
    /// Absolute first byte of the range.
    pub byte_offset: u64,
    /// Number of bytes to stream.
    pub byte_length: u64,
    /// Optional cap on the number of blocks visited.
    pub block_length: Option<u64>,
}

struct StreamState {
    feed: Arc<dyn Feed>,
    next_block: u64,
    skip: u64,
    remaining: u64,
    blocks_left: u64,
    seeked: bool,
    byte_offset: u64,
}

/// Stream the byte range described by `opts` as a sequence of chunks.
///
/// Chunks follow block boundaries, trimmed at the head and tail of the
/// range and split at [`READ_STREAM_HIGH_WATER_MARK`].
pub fn byte_stream(feed: Arc<dyn Feed>, opts: ByteStreamOptions) -> BoxStream<'static, Result<Bytes, FeedError>> {
    let state = StreamState {
        feed,
        next_block: opts.block_offset,
        skip: 0,
        remaining: opts.byte_length,
        blocks_left: opts.block_length.unwrap_or(u64::MAX),
        seeked: false,
        byte_offset: opts.byte_offset,
    };

    Box::pin(try_unfold(state, |mut state| async move {
        if state.remaining == 0 || state.blocks_left == 0 {
            return Ok(None);
        }
        if !state.seeked {
            let (block, rel) = state.feed.seek(state.byte_offset).await?;
            state.next_block = block.max(state.next_block);
            state.skip = if block >= state.next_block { rel } else { 0 };
            state.seeked = true;
        }

        let block = state.feed.get(state.next_block).await?;
        state.next_block += 1;
        state.blocks_left -= 1;

        let start = state.skip.min(block.len() as u64) as usize;
        state.skip = 0;
        let take = ((block.len() - start) as u64).min(state.remaining) as usize;
        state.remaining -= take as u64;

        let mut chunk = block.slice(start..start + take);
        if chunk.len() > READ_STREAM_HIGH_WATER_MARK {
            // Split oversized blocks; push the tail back as pending skip on
            // the same block by rewinding.
            state.next_block -= 1;
            state.blocks_left += 1;
            state.skip = (start + READ_STREAM_HIGH_WATER_MARK) as u64;
            state.remaining += (chunk.len() - READ_STREAM_HIGH_WATER_MARK) as u64;
            chunk = chunk.slice(..READ_STREAM_HIGH_WATER_MARK);
        }
        Ok(Some((chunk, state)))
    }))
}

/// Read `len` bytes starting at `byte_offset` into one buffer.
///
/// Errors if the range extends past the end of the feed; callers clamp
/// before asking.
pub async fn read_range(feed: &dyn Feed, byte_offset: u64, len: u64) -> Result<Bytes, FeedError> {
    if len == 0 {
        return Ok(Bytes::new());
    }
    let byte_len = feed.byte_len().await;
    if byte_offset + len > byte_len {
        return Err(FeedError::ByteRangeOutOfRange {
            start: byte_offset,
            end: byte_offset + len,
            byte_len,
        });
    }

    let (mut index, mut rel) = feed.seek(byte_offset).await?;
    let mut out = BytesMut::with_capacity(len as usize);
    let mut remaining = len as usize;
    while remaining > 0 {
        let block = feed.get(index).await?;
        let start = rel as usize;
        let take = (block.len() - start).min(remaining);
        out.extend_from_slice(&block[start..start + take]);
        remaining -= take;
        rel = 0;
        index += 1;
    }
    Ok(out.freeze())
}
