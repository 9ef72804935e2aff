//! Protobuf wire codec for stat records.
//!
//! The wire form is the `hyperdrive-schemas` `Stat` message: field tags
//! mode=1, uid=2, gid=3, size=4, blocks=5, offset=6, byteOffset=7, mtime=8,
//! ctime=9, linkname=10, mount=11; nested `Mount` tags key=1, version=2,
//! hash=3, hypercore=4. Peer implementations materialize the numeric
//! defaults when encoding, so every numeric field is written even when zero.

use prost::Message;
use snafu::Snafu;

use crate::stat::Mount;
use crate::stat::S_IFDIR;
use crate::stat::S_IFMT;
use crate::stat::Stat;
use crate::stat::StatKind;

/// Errors from stat encode/decode.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StatCodecError {
    /// The blob is not a valid Stat message.
    #[snafu(display("corrupt stat record: {source}"))]
    Decode {
        /// The underlying protobuf decode error.
        source: prost::DecodeError,
    },

    /// The mount key field has the wrong length.
    #[snafu(display("mount key has {len} bytes, expected 32"))]
    InvalidMountKey {
        /// Actual length of the key field.
        len: usize,
    },
}

#[derive(Clone, PartialEq, Message)]
struct StatWire {
    #[prost(uint32, required, tag = "1")]
    mode: u32,
    #[prost(uint32, optional, tag = "2")]
    uid: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    gid: Option<u32>,
    #[prost(uint64, optional, tag = "4")]
    size: Option<u64>,
    #[prost(uint64, optional, tag = "5")]
    blocks: Option<u64>,
    #[prost(uint64, optional, tag = "6")]
    offset: Option<u64>,
    #[prost(uint64, optional, tag = "7")]
    byte_offset: Option<u64>,
    #[prost(uint64, optional, tag = "8")]
    mtime: Option<u64>,
    #[prost(uint64, optional, tag = "9")]
    ctime: Option<u64>,
    #[prost(string, optional, tag = "10")]
    linkname: Option<String>,
    #[prost(message, optional, tag = "11")]
    mount: Option<MountWire>,
}

#[derive(Clone, PartialEq, Message)]
struct MountWire {
    #[prost(bytes = "vec", required, tag = "1")]
    key: Vec<u8>,
    #[prost(uint64, optional, tag = "2")]
    version: Option<u64>,
    #[prost(bytes = "vec", optional, tag = "3")]
    hash: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "4")]
    hypercore: Option<bool>,
}

impl Stat {
    /// Encode the record to its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let (size, blocks, offset, byte_offset, linkname) = match &self.kind {
            StatKind::File {
                size,
                blocks,
                offset,
                byte_offset,
            } => (*size, *blocks, *offset, *byte_offset, None),
            StatKind::Directory => (0, 0, 0, 0, None),
            StatKind::Symlink { linkname } => (0, 0, 0, 0, Some(linkname.clone())),
        };

        let wire = StatWire {
            mode: self.mode,
            uid: Some(self.uid),
            gid: Some(self.gid),
            size: Some(size),
            blocks: Some(blocks),
            offset: Some(offset),
            byte_offset: Some(byte_offset),
            mtime: Some(self.mtime),
            ctime: Some(self.ctime),
            linkname,
            mount: self.mount.as_ref().map(|m| MountWire {
                key: m.key.to_vec(),
                version: m.version,
                hash: m.hash.clone(),
                hypercore: m.hypercore.then_some(true),
            }),
        };

        wire.encode_to_vec()
    }

    /// Decode a record from its wire form.
    ///
    /// The variant is derived mechanically: a non-empty `linkname` makes a
    /// symlink, a directory mode bit makes a directory, anything else is a
    /// file.
    pub fn decode(blob: &[u8]) -> Result<Self, StatCodecError> {
        let wire = StatWire::decode(blob).map_err(|source| StatCodecError::Decode { source })?;

        let kind = match wire.linkname {
            Some(linkname) if !linkname.is_empty() => StatKind::Symlink { linkname },
            _ if wire.mode & S_IFMT == S_IFDIR => StatKind::Directory,
            _ => StatKind::File {
                size: wire.size.unwrap_or(0),
                blocks: wire.blocks.unwrap_or(0),
                offset: wire.offset.unwrap_or(0),
                byte_offset: wire.byte_offset.unwrap_or(0),
            },
        };

        let mount = match wire.mount {
            Some(m) => {
                let key: [u8; 32] = m
                    .key
                    .as_slice()
                    .try_into()
                    .map_err(|_| StatCodecError::InvalidMountKey { len: m.key.len() })?;
                Some(Mount {
                    key,
                    version: m.version,
                    hash: m.hash,
                    hypercore: m.hypercore.unwrap_or(false),
                })
            }
            None => None,
        };

        Ok(Stat {
            mode: wire.mode,
            uid: wire.uid.unwrap_or(0),
            gid: wire.gid.unwrap_or(0),
            mtime: wire.mtime.unwrap_or(0),
            ctime: wire.ctime.unwrap_or(0),
            kind,
            mount,
        })
    }
}
