use std::io;

use thiserror::Error;

/// Errors surfaced by the transport façade.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No data arrived within the caller's deadline.
    #[error("timed out waiting for the peer")]
    Timeout,

    /// The peer closed its sending side before a full line arrived.
    #[error("peer closed the connection")]
    PeerClosed,

    /// A control line exceeded the caller's length limit.
    #[error("line exceeded the {limit}-byte limit")]
    Overflow {
        /// The limit that was exceeded.
        limit: usize,
    },

    /// Every port in the requested listen range was already bound.
    #[error("no free port in {lo}..={hi}")]
    PortRangeExhausted {
        /// First port tried.
        lo: u16,
        /// Last port tried.
        hi: u16,
    },

    /// Any other socket-level failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Classifies an [`io::Error`] from a socket read/write with an
    /// armed timeout: `WouldBlock`/`TimedOut` mean the deadline fired.
    #[must_use]
    pub fn from_socket_io(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe => Self::PeerClosed,
            _ => Self::Io(error),
        }
    }

    /// Whether this error is the expiry of a caller-supplied deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
