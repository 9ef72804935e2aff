//! The stat record model.

/// File-type mask of the mode field.
pub const S_IFMT: u32 = 0o170000;

/// Regular file bit.
pub const S_IFREG: u32 = 0o100000;

/// Directory bit.
pub const S_IFDIR: u32 = 0o040000;

/// Symbolic link bit.
pub const S_IFLNK: u32 = 0o120000;

/// Default mode for new files (`-rw-r--r--`).
pub const DEFAULT_FILE_MODE: u32 = S_IFREG | 0o644;

/// Default mode for new directories (`drwxr-xr-x`).
pub const DEFAULT_DIR_MODE: u32 = S_IFDIR | 0o755;

/// Default mode for symlinks (`lrwxrwxrwx`).
pub const DEFAULT_SYMLINK_MODE: u32 = S_IFLNK | 0o777;

/// A mount attachment on a stat record.
///
/// When `hypercore` is true the mount is a raw content feed rooted at the
/// stat's path; otherwise it is a foreign trie grafted there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Public key of the foreign feed.
    pub key: [u8; 32],
    /// Pinned version of the foreign trie, if any.
    pub version: Option<u64>,
    /// Pinned root hash of the foreign trie, if any.
    pub hash: Option<Vec<u8>>,
    /// Whether the mount is a raw content feed instead of a trie.
    pub hypercore: bool,
}

impl Mount {
    /// A plain trie mount of the feed with the given public key.
    pub fn trie(key: [u8; 32]) -> Self {
        Self {
            key,
            version: None,
            hash: None,
            hypercore: false,
        }
    }

    /// A raw content feed mount of the feed with the given public key.
    pub fn hypercore(key: [u8; 32]) -> Self {
        Self {
            key,
            version: None,
            hash: None,
            hypercore: true,
        }
    }
}

/// Variant-specific fields of a stat record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatKind {
    /// Regular file backed by a contiguous block range of the content feed.
    File {
        /// File size in bytes.
        size: u64,
        /// Number of content feed blocks spanned by the file.
        blocks: u64,
        /// Index of the first content feed block.
        offset: u64,
        /// Byte index of the first content byte in the content feed.
        byte_offset: u64,
    },
    /// Directory. Carries no content feed reference.
    Directory,
    /// Symbolic link; `linkname` is resolved at stat-time.
    Symlink {
        /// Target path of the link.
        linkname: String,
    },
}

/// Metadata record for one filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// POSIX mode bits (file type and permissions). Stored, not enforced.
    pub mode: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Modification time, milliseconds since the epoch.
    pub mtime: u64,
    /// Creation time, milliseconds since the epoch.
    pub ctime: u64,
    /// Variant-specific fields.
    pub kind: StatKind,
    /// Mount attachment, if the entry is a mount point.
    pub mount: Option<Mount>,
}

impl Stat {
    /// A file stat over the given content feed range, with default mode.
    pub fn file(size: u64, blocks: u64, offset: u64, byte_offset: u64) -> Self {
        Self {
            mode: DEFAULT_FILE_MODE,
            uid: 0,
            gid: 0,
            mtime: 0,
            ctime: 0,
            kind: StatKind::File {
                size,
                blocks,
                offset,
                byte_offset,
            },
            mount: None,
        }
    }

    /// A directory stat with default mode.
    pub fn directory() -> Self {
        Self {
            mode: DEFAULT_DIR_MODE,
            uid: 0,
            gid: 0,
            mtime: 0,
            ctime: 0,
            kind: StatKind::Directory,
            mount: None,
        }
    }

    /// A symlink stat pointing at `linkname`.
    pub fn symlink(linkname: impl Into<String>) -> Self {
        Self {
            mode: DEFAULT_SYMLINK_MODE,
            uid: 0,
            gid: 0,
            mtime: 0,
            ctime: 0,
            kind: StatKind::Symlink {
                linkname: linkname.into(),
            },
            mount: None,
        }
    }

    /// Replace the permission bits, preserving the file-type bits.
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = (self.mode & S_IFMT) | (mode & !S_IFMT);
        self
    }

    /// Set owner ids.
    #[must_use]
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Set both timestamps.
    #[must_use]
    pub fn with_times(mut self, mtime: u64, ctime: u64) -> Self {
        self.mtime = mtime;
        self.ctime = ctime;
        self
    }

    /// Attach a mount record.
    #[must_use]
    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mount = Some(mount);
        self
    }

    /// Whether the record describes a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self.kind, StatKind::File { .. })
    }

    /// Whether the record describes a directory.
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, StatKind::Directory)
    }

    /// Whether the record describes a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, StatKind::Symlink { .. })
    }

    /// File size in bytes; 0 for directories and symlinks.
    pub fn size(&self) -> u64 {
        match self.kind {
            StatKind::File { size, .. } => size,
            _ => 0,
        }
    }

    /// Content feed block count; 0 for directories and symlinks.
    pub fn blocks(&self) -> u64 {
        match self.kind {
            StatKind::File { blocks, .. } => blocks,
            _ => 0,
        }
    }

    /// First content feed block index; 0 for directories and symlinks.
    pub fn offset(&self) -> u64 {
        match self.kind {
            StatKind::File { offset, .. } => offset,
            _ => 0,
        }
    }

    /// First content byte index; 0 for directories and symlinks.
    pub fn byte_offset(&self) -> u64 {
        match self.kind {
            StatKind::File { byte_offset, .. } => byte_offset,
            _ => 0,
        }
    }

    /// Symlink target, if the record is a symlink.
    pub fn linkname(&self) -> Option<&str> {
        match &self.kind {
            StatKind::Symlink { linkname } => Some(linkname),
            _ => None,
        }
    }

    /// The mount attachment, if the entry is a raw content feed mount.
    pub fn hypercore_mount(&self) -> Option<&Mount> {
        self.mount.as_ref().filter(|m| m.hypercore)
    }

    /// Overwrite the size of a file stat. No-op for other variants.
    pub fn set_size(&mut self, size: u64) {
        if let StatKind::File { size: s, .. } = &mut self.kind {
            *s = size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_defaults() {
        let st = Stat::file(5, 1, 2, 10);
        assert!(st.is_file());
        assert!(!st.is_directory());
        assert_eq!(st.mode, DEFAULT_FILE_MODE);
        assert_eq!(st.size(), 5);
        assert_eq!(st.blocks(), 1);
        assert_eq!(st.offset(), 2);
        assert_eq!(st.byte_offset(), 10);
    }

    #[test]
    fn directory_has_no_content_reference() {
        let st = Stat::directory();
        assert!(st.is_directory());
        assert_eq!(st.size(), 0);
        assert_eq!(st.blocks(), 0);
        assert_eq!(st.offset(), 0);
    }

    #[test]
    fn symlink_linkname() {
        let st = Stat::symlink("/a.txt");
        assert!(st.is_symlink());
        assert_eq!(st.linkname(), Some("/a.txt"));
        assert_eq!(st.mode & S_IFMT, S_IFLNK);
    }

    #[test]
    fn with_mode_preserves_type_bits() {
        let st = Stat::file(0, 0, 0, 0).with_mode(0o600);
        assert_eq!(st.mode, S_IFREG | 0o600);

        // A caller passing full mode bits must not flip the file type.
        let st = Stat::directory().with_mode(S_IFREG | 0o644);
        assert_eq!(st.mode & S_IFMT, S_IFDIR);
    }

    #[test]
    fn set_size_only_touches_files() {
        let mut st = Stat::file(5, 1, 0, 0);
        st.set_size(9);
        assert_eq!(st.size(), 9);

        let mut st = Stat::directory();
        st.set_size(9);
        assert_eq!(st.size(), 0);
    }

    #[test]
    fn hypercore_mount_filter() {
        let st = Stat::file(0, 0, 0, 0).with_mount(Mount::trie([7u8; 32]));
        assert!(st.hypercore_mount().is_none());

        let st = Stat::file(0, 0, 0, 0).with_mount(Mount::hypercore([7u8; 32]));
        assert_eq!(st.hypercore_mount().map(|m| m.key), Some([7u8; 32]));
    }
}
