#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Blocking TCP primitives shared by the control and data channels.
//!
//! Everything network-shaped the daemon does goes through this façade:
//! listeners (fixed port or first-free-in-range), accepts with a
//! deadline, outbound connects that try every resolved address, and a
//! line-oriented receive path that preserves the CRLF terminator and
//! distinguishes timeouts, peer closes, and oversized lines. Socket
//! options (`SO_REUSEADDR`, `IPV6_V6ONLY`, keepalive, the listen
//! backlog) are applied through `socket2` so the rest of the workspace
//! never touches raw descriptors.

mod conn;
mod error;
mod listener;

pub use conn::Connection;
pub use error::TransportError;
pub use listener::{connect, connect_timeout, AddrFamily, Listener};
