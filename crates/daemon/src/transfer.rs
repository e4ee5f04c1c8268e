//! The background transfer worker.
//!
//! Each RETR/STOR/APPE/LIST/NLST spawns one worker thread that owns
//! the data connection and the file lock for the duration of the
//! transfer. The control thread stays on the command loop, so an ABOR
//! arriving mid-transfer can raise the abort flag and slam the data
//! socket; the worker notices on its next loop iteration (or failed
//! syscall), emits the final 426/226 sequence itself, releases the
//! lock, and parks the transfer state back at idle.

use std::sync::Arc;

use protocol::{Reply, ReplyCode};
use tracing::{debug, error, info};
use transport::Connection;
use vfs::fs::{ReadStream, WriteStream};
use vfs::{fs as vfsfs, listing, ExclusiveGuard, FileInfo, SharedGuard};

use crate::ascii::{self, CrlfCollapse};
use crate::session::{SessionShared, TransferState};

/// Scratch-buffer size for data-channel copies.
const CHUNK: usize = 64 * 1024;

/// The file lock a transfer holds while it runs.
#[derive(Debug)]
pub(crate) enum HeldLock {
    /// Downloads share the path with other readers.
    Shared(SharedGuard),
    /// Uploads own the path exclusively.
    Exclusive(ExclusiveGuard),
    /// Listings take no lock.
    None,
}

/// What the worker is asked to move.
#[derive(Debug)]
pub(crate) enum TransferKind {
    /// RETR: file bytes to the peer.
    SendFile {
        /// Open read handle, already positioned at the restart offset.
        reader: ReadStream,
        /// Bytes expected on the wire (pre-translation).
        expected: u64,
    },
    /// STOR/APPE: peer bytes into a file.
    RecvFile {
        /// Target path and disposition, opened by the worker.
        writer: WriteStream,
    },
    /// LIST: formatted directory lines.
    SendList {
        /// Entries to render.
        entries: Vec<FileInfo>,
    },
    /// NLST: bare names.
    SendNlst {
        /// Names to send.
        names: Vec<String>,
    },
}

/// Everything a worker needs, bundled at 150 time.
#[derive(Debug)]
pub(crate) struct TransferTask {
    /// The established data connection; owned by the worker.
    pub(crate) data: Connection,
    /// Payload description.
    pub(crate) kind: TransferKind,
    /// Whether TYPE A translation applies.
    pub(crate) ascii: bool,
    /// The lock held on the subject path.
    pub(crate) lock: HeldLock,
}

enum Status {
    Ok(u64),
    Aborted,
    ConnError,
    IoError,
}

/// Worker entry point; runs on its own thread.
pub(crate) fn run(shared: &Arc<SessionShared>, task: TransferTask) {
    shared.set_transfer_state(TransferState::Running);

    let TransferTask {
        mut data,
        kind,
        ascii,
        lock,
    } = task;

    let is_upload = matches!(kind, TransferKind::RecvFile { .. });
    let is_download = matches!(kind, TransferKind::SendFile { .. });
    let status = match kind {
        TransferKind::SendFile { reader, expected } => {
            send_file(shared, &mut data, reader, expected, ascii)
        }
        TransferKind::RecvFile { writer } => recv_file(shared, &mut data, writer, ascii),
        TransferKind::SendList { entries } => send_lines(
            shared,
            &mut data,
            entries.iter().map(listing::format_list_line),
        ),
        TransferKind::SendNlst { names } => send_lines(shared, &mut data, names.into_iter()),
    };

    // Closing the data socket is the end-of-payload signal.
    let _ = data.shutdown_both();
    drop(data);
    shared.take_data_shutdown();

    let aborted = matches!(status, Status::Aborted);
    match &status {
        Status::Ok(bytes) => {
            info!(session = shared.id, bytes, "transfer complete");
            let _ = shared.send_reply(&Reply::new(
                ReplyCode::ClosingDataConnection,
                "Transfer complete",
            ));
        }
        Status::Aborted => {
            debug!(session = shared.id, "transfer aborted by client");
            let _ = shared.send_reply(&Reply::new(
                ReplyCode::TransferAborted,
                "Data connection closed; transfer aborted",
            ));
            let _ = shared.send_reply(&Reply::new(
                ReplyCode::ClosingDataConnection,
                "ABOR command successful",
            ));
        }
        Status::ConnError => {
            let _ = shared.send_reply(&Reply::new(
                ReplyCode::TransferAborted,
                "Data connection closed; transfer aborted",
            ));
        }
        Status::IoError => {
            error!(session = shared.id, "local I/O error during transfer");
            let _ = shared.send_reply(&Reply::new(
                ReplyCode::LocalProcessingError,
                "Local error in processing",
            ));
        }
    }

    drop(lock);

    if let Status::Ok(bytes) = status {
        if is_upload {
            shared.stats.record_upload(bytes);
        } else if is_download {
            shared.stats.record_download(bytes);
        }
    }

    shared.set_transfer_state(if aborted {
        TransferState::Aborted
    } else {
        TransferState::Completing
    });
    shared.clear_abort();
    shared.set_transfer_state(TransferState::Idle);
}

fn send_file(
    shared: &SessionShared,
    data: &mut Connection,
    mut reader: ReadStream,
    expected: u64,
    ascii: bool,
) -> Status {
    let mut buf = vec![0u8; CHUNK];
    let mut translated = Vec::with_capacity(CHUNK * 2);
    let mut sent: u64 = 0;
    let mut remaining = expected;

    loop {
        if shared.abort_requested() {
            return Status::Aborted;
        }
        if remaining == 0 {
            return Status::Ok(sent);
        }
        let want = buf.len().min(remaining as usize);
        let n = match reader.read_chunk(&mut buf[..want]) {
            Ok(0) => return Status::Ok(sent),
            Ok(n) => n,
            Err(_) => return Status::IoError,
        };
        remaining -= n as u64;

        let payload: &[u8] = if ascii {
            translated.clear();
            ascii::expand_lf(&buf[..n], &mut translated);
            &translated
        } else {
            &buf[..n]
        };
        if data.send_all(payload).is_err() {
            return if shared.abort_requested() {
                Status::Aborted
            } else {
                Status::ConnError
            };
        }
        sent += n as u64;
    }
}

fn recv_file(
    shared: &SessionShared,
    data: &mut Connection,
    mut writer: WriteStream,
    ascii: bool,
) -> Status {
    let translate = ascii && ascii::inbound_translation_enabled();
    let mut buf = vec![0u8; CHUNK];
    let mut collapsed = Vec::with_capacity(CHUNK);
    let mut collapse = CrlfCollapse::new();

    loop {
        if shared.abort_requested() {
            return Status::Aborted;
        }
        let n = match data.recv_some(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => {
                return if shared.abort_requested() {
                    Status::Aborted
                } else {
                    Status::ConnError
                };
            }
        };

        let payload: &[u8] = if translate {
            collapsed.clear();
            collapse.push(&buf[..n], &mut collapsed);
            &collapsed
        } else {
            &buf[..n]
        };
        if writer.write_chunk(payload).is_err() {
            return Status::IoError;
        }
    }

    if translate {
        collapsed.clear();
        collapse.finish(&mut collapsed);
        if !collapsed.is_empty() && writer.write_chunk(&collapsed).is_err() {
            return Status::IoError;
        }
    }
    match writer.finish() {
        Ok(written) => Status::Ok(written),
        Err(_) => Status::IoError,
    }
}

fn send_lines<I, S>(shared: &SessionShared, data: &mut Connection, lines: I) -> Status
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let mut sent: u64 = 0;
    for line in lines {
        if shared.abort_requested() {
            return Status::Aborted;
        }
        let mut wire = line.as_ref().to_string();
        wire.push_str("\r\n");
        if data.send_all(wire.as_bytes()).is_err() {
            return if shared.abort_requested() {
                Status::Aborted
            } else {
                Status::ConnError
            };
        }
        sent += wire.len() as u64;
    }
    Status::Ok(sent)
}

/// Builds the listing payload for a resolved LIST target.
///
/// A directory renders every entry; a plain file renders the single
/// entry LIST-of-a-file clients expect.
pub(crate) fn list_entries(physical: &std::path::Path) -> Result<Vec<FileInfo>, vfs::VfsError> {
    if vfsfs::is_dir(physical) {
        vfsfs::list_dir(physical)
    } else {
        Ok(vec![vfsfs::file_info(physical)?])
    }
}

/// Builds the NLST payload for a resolved target.
pub(crate) fn nlst_names(physical: &std::path::Path) -> Result<Vec<String>, vfs::VfsError> {
    Ok(list_entries(physical)?
        .into_iter()
        .map(|info| info.name)
        .collect())
}
