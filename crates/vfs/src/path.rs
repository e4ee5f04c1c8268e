//! Virtual-path normalization and sandbox mapping.
//!
//! Clients see a rooted, `/`-separated namespace. Every user-supplied
//! path is normalized into a canonical virtual absolute form first and
//! only then mapped onto the physical sandbox; the pre-normalization
//! input is additionally screened for literal `..` sequences and
//! drive-letter forms, in that order.

use std::path::{Path, PathBuf};

use crate::error::VfsError;

/// A successfully resolved client path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolved {
    /// Canonical virtual absolute path (`/`-rooted, no `.`/`..`).
    pub virtual_path: String,
    /// Physical location under the sandbox root.
    pub physical: PathBuf,
}

/// Normalizes `input` against the session's current virtual directory.
///
/// Relative inputs are joined onto `current_dir`; backslashes are
/// folded to `/`, runs of separators collapse, `.` segments drop, and
/// `..` pops one component (stopping at the root). The result always
/// starts with `/` and contains no dot segments.
#[must_use]
pub fn normalize_virtual(current_dir: &str, input: &str) -> String {
    let joined = if input.starts_with('/') || input.starts_with('\\') {
        input.to_string()
    } else {
        format!("{current_dir}/{input}")
    };
    let unified = joined.replace('\\', "/");

    let mut components: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other),
        }
    }

    if components.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", components.join("/"))
    }
}

/// Screens the raw client input for traversal and drive-letter forms.
///
/// Runs after normalization by contract: normalization alone already
/// confines the result to the virtual root, and this check rejects the
/// suspicious spellings outright as defense in depth.
pub fn screen_raw_input(input: &str) -> Result<(), VfsError> {
    if input.contains("..") {
        return Err(VfsError::Forbidden(input.to_string()));
    }
    let bytes = input.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(VfsError::Forbidden(input.to_string()));
    }
    Ok(())
}

/// Maps a client path to its virtual and physical forms.
///
/// `current_dir` must already be a canonical virtual absolute path.
/// The caller still owes the sandbox access check
/// ([`virtual_is_within`]) against the user's home subtree.
pub fn resolve_virtual(
    root: &Path,
    current_dir: &str,
    input: &str,
) -> Result<Resolved, VfsError> {
    if input.len() > 4096 {
        return Err(VfsError::BadPath(String::from("path too long")));
    }
    let virtual_path = normalize_virtual(current_dir, input);
    screen_raw_input(input)?;

    let relative = virtual_path.trim_start_matches('/');
    let physical = if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    };

    Ok(Resolved {
        virtual_path,
        physical,
    })
}

/// Whether `virtual_path` equals `home` or lies strictly below it.
///
/// The component boundary is exactly `/`: `/home/bobby` is not inside
/// `/home/bob`. A home of `/` admits everything.
#[must_use]
pub fn virtual_is_within(virtual_path: &str, home: &str) -> bool {
    if home == "/" {
        return virtual_path.starts_with('/');
    }
    let home = home.trim_end_matches('/');
    virtual_path == home
        || virtual_path
            .strip_prefix(home)
            .is_some_and(|rest| rest.starts_with('/'))
}
