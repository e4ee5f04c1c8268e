//! Façade over `std::fs` used by the handlers and the transfer worker.
//!
//! All disk access funnels through here so the rest of the workspace
//! stays free of platform conditionals. Ranged access is exposed as
//! open handles ([`ReadStream`], [`WriteStream`]) because transfers
//! pull 64 KiB chunks in a loop; the one-shot `read_range` and
//! `write_range` helpers exist for small consumers and tests.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::VfsError;
use crate::info::FileInfo;

/// Nesting limit for recursive directory removal.
pub const MAX_RECURSION_DEPTH: usize = 256;

/// Joins a base path with a relative component.
#[must_use]
pub fn join(base: &Path, rel: &str) -> PathBuf {
    base.join(rel)
}

/// Whether `path` names an existing entry (symlinks count, unfollowed).
#[must_use]
pub fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Whether `path` is a directory (after following symlinks).
#[must_use]
pub fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Size of the file at `path` in bytes.
pub fn size(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

/// Last modification time of `path`.
pub fn mtime(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Metadata snapshot of a single entry, symlinks not followed.
pub fn file_info(path: &Path) -> Result<FileInfo, VfsError> {
    let metadata = fs::symlink_metadata(path)
        .map_err(|_| VfsError::NotFound(path.to_path_buf()))?;
    let name = filename_of(path).unwrap_or_else(|| String::from("/"));
    let link_target = if metadata.file_type().is_symlink() {
        fs::read_link(path)
            .ok()
            .map(|target| target.to_string_lossy().into_owned())
    } else {
        None
    };
    Ok(FileInfo::from_metadata(name, &metadata, link_target))
}

/// Enumerates a directory, sorted by name.
pub fn list_dir(path: &Path) -> Result<Vec<FileInfo>, VfsError> {
    if !exists(path) {
        return Err(VfsError::NotFound(path.to_path_buf()));
    }
    if !is_dir(path) {
        return Err(VfsError::NotADirectory(path.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if let Ok(info) = file_info(&entry.path()) {
            entries.push(info);
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// An open file positioned for sequential ranged reads.
#[derive(Debug)]
pub struct ReadStream {
    file: File,
}

impl ReadStream {
    /// Opens `path` and seeks to `offset`.
    pub fn open(path: &Path, offset: u64) -> io::Result<Self> {
        let mut file = File::open(path)?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(Self { file })
    }

    /// Reads the next chunk; 0 means end of file.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// How a [`WriteStream`] treats existing bytes at the target path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteDisposition {
    /// Replace the file from the beginning (STOR without restart).
    Truncate,
    /// Keep bytes before `offset` and write from there (STOR + REST).
    FromOffset(u64),
    /// Append to the current end (APPE).
    Append,
}

/// An open file positioned for sequential ranged writes.
#[derive(Debug)]
pub struct WriteStream {
    file: File,
    written: u64,
    truncate_from: Option<u64>,
}

impl WriteStream {
    /// Opens (creating if needed) `path` for writing per `disposition`.
    pub fn open(path: &Path, disposition: WriteDisposition) -> io::Result<Self> {
        match disposition {
            WriteDisposition::Truncate => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?;
                Ok(Self {
                    file,
                    written: 0,
                    truncate_from: None,
                })
            }
            WriteDisposition::FromOffset(offset) => {
                let mut file = OpenOptions::new().write(true).create(true).open(path)?;
                file.seek(SeekFrom::Start(offset))?;
                Ok(Self {
                    file,
                    written: 0,
                    truncate_from: Some(offset),
                })
            }
            WriteDisposition::Append => {
                let file = OpenOptions::new().append(true).create(true).open(path)?;
                Ok(Self {
                    file,
                    written: 0,
                    truncate_from: None,
                })
            }
        }
    }

    /// Writes one chunk at the current position.
    pub fn write_chunk(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(())
    }

    /// Total bytes written through this stream.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flushes and, for offset writes, trims the file at the final
    /// position so a restarted upload cannot leave stale tail bytes.
    pub fn finish(mut self) -> io::Result<u64> {
        self.file.flush()?;
        if let Some(offset) = self.truncate_from {
            self.file.set_len(offset + self.written)?;
        }
        self.file.sync_all()?;
        Ok(self.written)
    }
}

/// One-shot ranged read used by small consumers.
pub fn read_range(path: &Path, offset: u64, out: &mut [u8]) -> io::Result<usize> {
    let mut stream = ReadStream::open(path, offset)?;
    let mut filled = 0;
    while filled < out.len() {
        let n = stream.read_chunk(&mut out[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// One-shot ranged write used by small consumers.
pub fn write_range(path: &Path, offset: u64, data: &[u8]) -> io::Result<u64> {
    let mut stream = WriteStream::open(path, WriteDisposition::FromOffset(offset))?;
    stream.write_chunk(data)?;
    stream.finish()
}

/// Creates a single directory.
pub fn create_dir(path: &Path) -> io::Result<()> {
    fs::create_dir(path)
}

/// Deletes a regular file (or a symlink, without following it).
pub fn delete_file(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

/// Deletes a directory.
///
/// Non-recursive removal requires the directory to be empty. The
/// recursive walk never follows symbolic links (they are unlinked in
/// place) and gives up past [`MAX_RECURSION_DEPTH`] levels so a
/// link cycle or pathological tree cannot wedge the daemon.
pub fn delete_dir(path: &Path, recursive: bool) -> Result<(), VfsError> {
    if !exists(path) {
        return Err(VfsError::NotFound(path.to_path_buf()));
    }
    if !is_dir(path) {
        return Err(VfsError::NotADirectory(path.to_path_buf()));
    }
    if recursive {
        remove_tree(path, 0)
    } else {
        fs::remove_dir(path).map_err(VfsError::Io)
    }
}

fn remove_tree(path: &Path, depth: usize) -> Result<(), VfsError> {
    if depth >= MAX_RECURSION_DEPTH {
        return Err(VfsError::TooDeep(path.to_path_buf()));
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();
        let metadata = fs::symlink_metadata(&entry_path)?;
        if metadata.is_dir() && !metadata.file_type().is_symlink() {
            remove_tree(&entry_path, depth + 1)?;
        } else {
            fs::remove_file(&entry_path)?;
        }
    }
    fs::remove_dir(path).map_err(VfsError::Io)
}

/// Renames `from` to `to`.
pub fn rename(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

/// Parent directory of `path`, if it has one.
#[must_use]
pub fn parent_of(path: &Path) -> Option<PathBuf> {
    path.parent().map(Path::to_path_buf)
}

/// Final component of `path` as a string.
#[must_use]
pub fn filename_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_range_round_trips() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("data.bin");
        write_range(&target, 0, b"0123456789").expect("write");

        let mut buf = [0u8; 4];
        let n = read_range(&target, 3, &mut buf).expect("read");
        assert_eq!(n, 4);
        assert_eq!(&buf, b"3456");
    }

    #[test]
    fn offset_write_preserves_prefix_and_trims_tail() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("data.bin");
        write_range(&target, 0, b"AAAAAAAAAA").expect("seed");

        let mut stream =
            WriteStream::open(&target, WriteDisposition::FromOffset(4)).expect("open");
        stream.write_chunk(b"BB").expect("write");
        let written = stream.finish().expect("finish");
        assert_eq!(written, 2);

        let contents = fs::read(&target).expect("read back");
        assert_eq!(contents, b"AAAABB");
    }

    #[test]
    fn append_disposition_extends_file() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("log.txt");
        write_range(&target, 0, b"one").expect("seed");

        let mut stream = WriteStream::open(&target, WriteDisposition::Append).expect("open");
        stream.write_chunk(b"two").expect("write");
        stream.finish().expect("finish");

        assert_eq!(fs::read(&target).expect("read"), b"onetwo");
    }

    #[test]
    fn list_dir_is_sorted_and_skips_nothing() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("b.txt"), b"b").expect("b");
        fs::write(dir.path().join("a.txt"), b"a").expect("a");
        fs::create_dir(dir.path().join("sub")).expect("sub");

        let names: Vec<String> = list_dir(dir.path())
            .expect("list")
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, ["a.txt", "b.txt", "sub"]);
    }

    #[test]
    fn delete_dir_refuses_non_empty_without_recursive() {
        let dir = tempdir().expect("tempdir");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).expect("mkdir");
        fs::write(sub.join("f.txt"), b"x").expect("file");

        assert!(delete_dir(&sub, false).is_err());
        delete_dir(&sub, true).expect("recursive delete");
        assert!(!exists(&sub));
    }

    #[cfg(unix)]
    #[test]
    fn recursive_delete_unlinks_symlinks_without_following() {
        let dir = tempdir().expect("tempdir");
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).expect("outside");
        fs::write(outside.join("keep.txt"), b"keep").expect("keep");

        let doomed = dir.path().join("doomed");
        fs::create_dir(&doomed).expect("doomed");
        std::os::unix::fs::symlink(&outside, doomed.join("link")).expect("symlink");

        delete_dir(&doomed, true).expect("delete");
        assert!(!exists(&doomed));
        assert!(exists(&outside.join("keep.txt")));
    }

    #[test]
    fn path_helpers_split_and_join() {
        let joined = join(Path::new("/srv/ftp"), "pub/a.bin");
        assert_eq!(joined, Path::new("/srv/ftp/pub/a.bin"));
        assert_eq!(parent_of(&joined), Some(PathBuf::from("/srv/ftp/pub")));
        assert_eq!(filename_of(&joined), Some(String::from("a.bin")));
        assert_eq!(parent_of(Path::new("/")), None);
    }

    #[test]
    fn file_info_reports_kind_and_size() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("f.bin");
        fs::write(&target, [0u8; 10]).expect("write");

        let info = file_info(&target).expect("info");
        assert_eq!(info.name, "f.bin");
        assert_eq!(info.size, 10);
        assert_eq!(info.kind, crate::FileKind::File);
    }
}
