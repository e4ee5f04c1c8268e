use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by path resolution and the filesystem façade.
#[derive(Debug, Error)]
pub enum VfsError {
    /// The client-supplied path could not be mapped into the sandbox.
    #[error("malformed path: {0:?}")]
    BadPath(String),

    /// The path resolves outside the caller's permitted subtree.
    #[error("access to {0:?} is forbidden")]
    Forbidden(String),

    /// The path does not name an existing entry.
    #[error("no such file or directory: {0}")]
    NotFound(PathBuf),

    /// A directory operation was applied to a non-directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Recursive removal exceeded the nesting limit.
    #[error("directory tree too deep under {0}")]
    TooDeep(PathBuf),

    /// Any other filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}
