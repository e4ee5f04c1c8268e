#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Control-channel codec for the FTP daemon.
//!
//! The control protocol is line oriented: clients send CRLF-terminated
//! command lines (`VERB SP ARG? CRLF`, verbs case-insensitive) and the
//! server answers with three-digit replies, either as a single final
//! line (`NNN SP text CRLF`) or as a multi-line block whose
//! continuation lines use `NNN-text CRLF` and whose last line repeats
//! the code in final form.
//!
//! This crate owns the textual layer only: splitting a command line
//! into a [`ParsedCommand`], rendering [`Reply`] lines, and decoding
//! the typed arguments of PORT, TYPE, MODE, STRU, and REST. Session
//! state, permissions, and transfer semantics live in the daemon
//! crate; nothing here performs I/O.

mod args;
mod command;
mod error;
mod reply;

pub use args::{
    format_pasv_reply, parse_host_port, parse_mode, parse_restart_offset, parse_structure,
    parse_transfer_type, FileStructure, HostPort, TransferMode, TransferType,
};
pub use command::{parse_command, ParsedCommand, MAX_VERB_LEN};
pub use error::ProtocolError;
pub use reply::{format_reply, format_reply_cont, Reply, ReplyCode};
