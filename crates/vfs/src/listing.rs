//! `ls -l`-style rendering of [`FileInfo`] records for LIST replies.

use chrono::{DateTime, Local};

use crate::info::{FileInfo, FileKind};

const TYPE_MASK: u32 = 0o170_000;
const TYPE_SOCKET: u32 = 0o140_000;
const TYPE_SYMLINK: u32 = 0o120_000;
const TYPE_REGULAR: u32 = 0o100_000;
const TYPE_BLOCK: u32 = 0o060_000;
const TYPE_DIR: u32 = 0o040_000;
const TYPE_CHAR: u32 = 0o020_000;
const TYPE_FIFO: u32 = 0o010_000;

fn type_char(info: &FileInfo) -> char {
    match info.mode_bits & TYPE_MASK {
        TYPE_SOCKET => 's',
        TYPE_SYMLINK => 'l',
        TYPE_BLOCK => 'b',
        TYPE_DIR => 'd',
        TYPE_CHAR => 'c',
        TYPE_FIFO => 'p',
        TYPE_REGULAR => '-',
        _ => match info.kind {
            FileKind::Dir => 'd',
            FileKind::Symlink => 'l',
            FileKind::File | FileKind::Unknown => '-',
        },
    }
}

fn permission_string(mode: u32) -> String {
    let mut out = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Renders one listing line (no trailing CRLF).
///
/// The shape follows the traditional UNIX `ls -l` output that FTP
/// clients parse: type and permission column, link count, numeric
/// owner and group, size, an abbreviated-month timestamp, and the
/// entry name with ` -> target` appended for symlinks.
#[must_use]
pub fn format_list_line(info: &FileInfo) -> String {
    let stamp = DateTime::<Local>::from(info.mtime)
        .format("%b %d %H:%M")
        .to_string();

    let mut line = format!(
        "{}{} {:>4} {:<8} {:<8} {:>12} {} {}",
        type_char(info),
        permission_string(info.mode_bits),
        info.nlink,
        info.uid,
        info.gid,
        info.size,
        stamp,
        info.name,
    );
    if let Some(target) = &info.link_target {
        line.push_str(" -> ");
        line.push_str(target);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn sample(kind: FileKind, mode_bits: u32) -> FileInfo {
        FileInfo {
            name: String::from("sample.txt"),
            kind,
            size: 1234,
            mtime: SystemTime::UNIX_EPOCH,
            mode_bits,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            link_target: None,
        }
    }

    #[test]
    fn regular_file_line_shape() {
        let line = format_list_line(&sample(FileKind::File, 0o100_644));
        assert!(line.starts_with("-rw-r--r--"), "line: {line}");
        assert!(line.ends_with("sample.txt"), "line: {line}");
        assert!(line.contains(" 1234 "), "line: {line}");
    }

    #[test]
    fn directory_gets_d_type() {
        let line = format_list_line(&sample(FileKind::Dir, 0o040_755));
        assert!(line.starts_with("drwxr-xr-x"), "line: {line}");
    }

    #[test]
    fn symlink_appends_target() {
        let mut info = sample(FileKind::Symlink, 0o120_777);
        info.link_target = Some(String::from("real.txt"));
        let line = format_list_line(&info);
        assert!(line.starts_with("lrwxrwxrwx"), "line: {line}");
        assert!(line.ends_with("sample.txt -> real.txt"), "line: {line}");
    }

    #[test]
    fn permission_bits_render_individually() {
        assert_eq!(permission_string(0o640), "rw-r-----");
        assert_eq!(permission_string(0o777), "rwxrwxrwx");
        assert_eq!(permission_string(0o000), "---------");
    }
}
