#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! The FTP server kernel.
//!
//! A control connection is accepted by [`run_daemon`]'s listen loop
//! and handed to a dedicated session thread. The session reads CRLF
//! command lines, dispatches them through the [`registry`] (running
//! each verb's preflight hook first), and replies on the control
//! channel, which is serialized behind a per-session mutex so
//! multi-line replies reach the peer intact. RETR/STOR/APPE/LIST/NLST
//! negotiate a separate data connection (PORT or PASV), take the
//! appropriate entry in the process-wide file-lock table, and hand the
//! socket plus the lock to a background transfer worker so the control
//! channel stays responsive to ABOR.
//!
//! State that crosses threads (the control write side, the abort
//! flag, transfer status, statistics) lives in a shared session core;
//! everything else is owned by the session thread alone.

mod ascii;
mod config;
mod error;
mod handlers;
mod registry;
mod server;
mod session;
mod signals;
mod stats;
mod transfer;
mod users;

pub use config::{AddrFamilyArg, DaemonConfig, LogLevelArg};
pub use error::DaemonError;
pub use registry::{CommandOutcome, CommandRegistry, Preflight};
pub use server::run_daemon;
pub use session::{Session, SessionState};
pub use users::{password_digest, Permissions, User, UserStore};
