use std::fs::Metadata;
use std::time::SystemTime;

/// Kind of a directory entry as the listing layer distinguishes them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link (never followed by the façade).
    Symlink,
    /// Anything else (sockets, devices, fifos).
    Unknown,
}

/// Metadata snapshot of one directory entry.
///
/// Field sources are platform-dependent behind this façade: on Unix
/// the mode, link count, and ownership come straight from the inode;
/// elsewhere synthetic values are filled in so the listing formatter
/// never branches on the host platform.
#[derive(Clone, Debug)]
pub struct FileInfo {
    /// Entry name (no directory components).
    pub name: String,
    /// Entry kind.
    pub kind: FileKind,
    /// Size in bytes (of the link itself for symlinks).
    pub size: u64,
    /// Last modification time.
    pub mtime: SystemTime,
    /// POSIX-style mode bits, including the file-type nibble.
    pub mode_bits: u32,
    /// Hard-link count.
    pub nlink: u64,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Resolution of a symlink, when the entry is one.
    pub link_target: Option<String>,
}

impl FileInfo {
    /// Builds a [`FileInfo`] from `symlink_metadata` output.
    #[must_use]
    pub fn from_metadata(name: String, metadata: &Metadata, link_target: Option<String>) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_dir() {
            FileKind::Dir
        } else if file_type.is_file() {
            FileKind::File
        } else if file_type.is_symlink() {
            FileKind::Symlink
        } else {
            FileKind::Unknown
        };

        let (mode_bits, nlink, uid, gid) = platform_bits(metadata, kind);

        Self {
            name,
            kind,
            size: metadata.len(),
            mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            mode_bits,
            nlink,
            uid,
            gid,
            link_target,
        }
    }
}

#[cfg(unix)]
fn platform_bits(metadata: &Metadata, _kind: FileKind) -> (u32, u64, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (
        metadata.mode(),
        metadata.nlink(),
        metadata.uid(),
        metadata.gid(),
    )
}

// Hosts without POSIX modes get a synthetic permission bitset so the
// listing formatter stays platform-agnostic.
#[cfg(not(unix))]
fn platform_bits(metadata: &Metadata, kind: FileKind) -> (u32, u64, u32, u32) {
    let mut mode = match kind {
        FileKind::Dir => 0o040_755,
        FileKind::Symlink => 0o120_777,
        FileKind::File | FileKind::Unknown => 0o100_644,
    };
    if metadata.permissions().readonly() {
        mode &= !0o222;
    }
    (mode, 1, 0, 0)
}
