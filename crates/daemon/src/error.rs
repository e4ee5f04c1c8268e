use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal initialisation and runtime errors of the daemon.
///
/// Per-command failures never surface here; handlers convert those
/// into numeric replies on the control channel. This type covers the
/// conditions that justify exiting with a non-zero status.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A command-line flag was unknown or malformed.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The sandbox root could not be created or entered.
    #[error("cannot prepare server root {root}: {source}")]
    RootUnavailable {
        /// The configured root directory.
        root: PathBuf,
        /// The underlying filesystem error.
        source: io::Error,
    },

    /// The user database exists but could not be read.
    #[error("cannot read user database {path}: {source}")]
    UserDbUnreadable {
        /// The configured database path.
        path: PathBuf,
        /// The underlying filesystem error.
        source: io::Error,
    },

    /// The control listener could not be bound.
    #[error("cannot listen on port {port}: {source}")]
    BindFailed {
        /// The configured control port.
        port: u16,
        /// The underlying socket error.
        source: io::Error,
    },
}
