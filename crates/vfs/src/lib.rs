#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Filesystem access for the FTP daemon.
//!
//! Four concerns live here, all keyed to the sandbox model:
//!
//! - [`path`] maps client-visible virtual paths (always absolute,
//!   `/`-separated) onto physical paths under a per-session root and
//!   rejects traversal before anything touches the disk.
//! - [`fs`] is the façade over `std::fs` the handlers and the transfer
//!   worker use: metadata, directory enumeration, ranged read/write
//!   streams, and a recursive delete that refuses to follow symlinks.
//! - [`listing`] renders [`FileInfo`] records as the UNIX `ls -l`
//!   style lines LIST sends on the data channel.
//! - [`locks`] is the process-wide cooperative reader/writer lock
//!   table that serializes sessions touching the same physical file.

pub mod fs;
mod info;
pub mod listing;
pub mod locks;
pub mod path;

mod error;

pub use error::VfsError;
pub use info::{FileInfo, FileKind};
pub use locks::{ExclusiveGuard, LockTable, SharedGuard};
pub use path::{resolve_virtual, virtual_is_within, Resolved};
