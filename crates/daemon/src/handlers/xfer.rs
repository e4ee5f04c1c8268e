//! Transfer verbs: the handlers that spawn a worker.
//!
//! Shared shape: permission and path checks, a non-blocking peek at
//! the lock table for a readable busy reply, the blocking acquire,
//! revalidation under the lock, the 150 preliminary reply, the data
//! channel, and finally the handoff of socket + lock to the worker.
//! Past the handoff the control thread only relays ABOR.

use std::io;

use protocol::{ParsedCommand, ReplyCode, TransferType};
use tracing::debug;
use vfs::fs::{ReadStream, WriteDisposition, WriteStream};
use vfs::{fs as vfsfs, Resolved, VfsError};

use crate::registry::CommandOutcome;
use crate::session::{Session, TransferState, DATA_CHANNEL_TIMEOUT};
use crate::transfer::{self, HeldLock, TransferKind, TransferTask};
use crate::users::Permissions;

const BUSY_WRITING: &str = "File is currently being written to, please try again later";
const BUSY_READING: &str = "File is currently being read, please try again later";

fn resolve_or_deny(
    session: &Session,
    argument: &str,
) -> Result<Resolved, (ReplyCode, &'static str)> {
    match session.resolve(argument) {
        Ok(resolved) => Ok(resolved),
        Err(VfsError::Forbidden(_)) => Err((ReplyCode::FileUnavailable, "Permission denied")),
        Err(_) => Err((ReplyCode::FileUnavailable, "Invalid path")),
    }
}

fn transfer_slot_free(session: &Session) -> bool {
    session.shared.transfer_state() == TransferState::Idle
}

pub(crate) fn retr(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "RETR requires a file name");
    }
    if !transfer_slot_free(session) {
        return session.answer(ReplyCode::FileActionNotTaken, "Another transfer is in progress");
    }
    let resolved = match resolve_or_deny(session, &command.argument) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&resolved.virtual_path, Permissions::READ) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    if !vfsfs::exists(&resolved.physical) {
        return session.answer(ReplyCode::FileUnavailable, "No such file");
    }
    if vfsfs::is_dir(&resolved.physical) {
        return session.answer(ReplyCode::FileUnavailable, "Not a regular file");
    }

    if session.locks.is_exclusive_locked(&resolved.physical) {
        return session.answer(ReplyCode::FileActionNotTaken, BUSY_WRITING);
    }

    let guard = session.locks.acquire_shared(&resolved.physical);

    // Revalidate under the lock: the file may have shrunk or vanished
    // between the checks above and the acquire.
    let offset = session.take_rest();
    let size = match vfsfs::size(&resolved.physical) {
        Ok(size) => size,
        Err(_) => {
            drop(guard);
            return session.answer(ReplyCode::FileUnavailable, "No such file");
        }
    };
    if offset > size {
        drop(guard);
        return session.answer(ReplyCode::FileUnavailable, "Restart offset beyond file size");
    }
    let reader = match ReadStream::open(&resolved.physical, offset) {
        Ok(reader) => reader,
        Err(_) => {
            drop(guard);
            return session.answer(ReplyCode::FileUnavailable, "Failed to open file");
        }
    };

    session.reply(ReplyCode::FileStatusOkay, "Opening data connection")?;
    let Ok(data) = session.open_data_channel(DATA_CHANNEL_TIMEOUT) else {
        drop(guard);
        return session.answer(ReplyCode::CantOpenDataConnection, "Can't open data connection");
    };

    debug!(
        session = session.shared.id,
        path = %resolved.virtual_path,
        offset,
        "retrieve"
    );
    let task = TransferTask {
        data,
        kind: TransferKind::SendFile {
            reader,
            expected: size - offset,
        },
        ascii: session.transfer_type == TransferType::Ascii,
        lock: HeldLock::Shared(guard),
    };
    if session.start_transfer(task).is_err() {
        return session.answer(ReplyCode::FileActionNotTaken, "Another transfer is in progress");
    }
    Ok(CommandOutcome::Continue)
}

fn receive_into(
    session: &mut Session,
    command: &ParsedCommand,
    verb: &'static str,
    appending: bool,
) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(
            ReplyCode::SyntaxErrorInArguments,
            &format!("{verb} requires a file name"),
        );
    }
    if !transfer_slot_free(session) {
        return session.answer(ReplyCode::FileActionNotTaken, "Another transfer is in progress");
    }
    let resolved = match resolve_or_deny(session, &command.argument) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&resolved.virtual_path, Permissions::WRITE) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    if vfsfs::is_dir(&resolved.physical) {
        return session.answer(ReplyCode::FileUnavailable, "Is a directory");
    }

    if session.locks.is_exclusive_locked(&resolved.physical) {
        return session.answer(ReplyCode::FileActionNotTaken, BUSY_WRITING);
    }
    if session.locks.shared_count(&resolved.physical) > 0 {
        return session.answer(ReplyCode::FileActionNotTaken, BUSY_READING);
    }

    let guard = session.locks.acquire_exclusive(&resolved.physical);

    let offset = session.take_rest();
    let disposition = if appending {
        WriteDisposition::Append
    } else if offset > 0 {
        // The offset must land inside (or at the end of) the bytes
        // already present.
        let current = vfsfs::size(&resolved.physical).unwrap_or(0);
        if offset > current {
            drop(guard);
            return session.answer(ReplyCode::FileUnavailable, "Restart offset beyond file size");
        }
        WriteDisposition::FromOffset(offset)
    } else {
        WriteDisposition::Truncate
    };
    let writer = match WriteStream::open(&resolved.physical, disposition) {
        Ok(writer) => writer,
        Err(_) => {
            drop(guard);
            return session.answer(ReplyCode::FileUnavailable, "Failed to open file");
        }
    };

    session.reply(ReplyCode::FileStatusOkay, "Opening data connection")?;
    let Ok(data) = session.open_data_channel(DATA_CHANNEL_TIMEOUT) else {
        drop(guard);
        return session.answer(ReplyCode::CantOpenDataConnection, "Can't open data connection");
    };

    debug!(
        session = session.shared.id,
        path = %resolved.virtual_path,
        offset,
        appending,
        "store"
    );
    let task = TransferTask {
        data,
        kind: TransferKind::RecvFile { writer },
        ascii: session.transfer_type == TransferType::Ascii,
        lock: HeldLock::Exclusive(guard),
    };
    if session.start_transfer(task).is_err() {
        return session.answer(ReplyCode::FileActionNotTaken, "Another transfer is in progress");
    }
    Ok(CommandOutcome::Continue)
}

pub(crate) fn stor(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    receive_into(session, command, "STOR", false)
}

pub(crate) fn appe(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    receive_into(session, command, "APPE", true)
}

fn send_listing(
    session: &mut Session,
    command: &ParsedCommand,
    names_only: bool,
) -> io::Result<CommandOutcome> {
    if !transfer_slot_free(session) {
        return session.answer(ReplyCode::FileActionNotTaken, "Another transfer is in progress");
    }
    let target = if command.has_argument {
        command.argument.clone()
    } else {
        String::from(".")
    };
    let resolved = match resolve_or_deny(session, &target) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&resolved.virtual_path, Permissions::READ) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    if !vfsfs::exists(&resolved.physical) {
        return session.answer(ReplyCode::FileUnavailable, "No such file or directory");
    }

    let kind = if names_only {
        match transfer::nlst_names(&resolved.physical) {
            Ok(names) => TransferKind::SendNlst { names },
            Err(_) => {
                return session.answer(ReplyCode::LocalProcessingError, "Failed to read directory");
            }
        }
    } else {
        match transfer::list_entries(&resolved.physical) {
            Ok(entries) => TransferKind::SendList { entries },
            Err(_) => {
                return session.answer(ReplyCode::LocalProcessingError, "Failed to read directory");
            }
        }
    };

    session.reply(ReplyCode::FileStatusOkay, "Opening data connection for listing")?;
    let Ok(data) = session.open_data_channel(DATA_CHANNEL_TIMEOUT) else {
        return session.answer(ReplyCode::CantOpenDataConnection, "Can't open data connection");
    };

    let task = TransferTask {
        data,
        kind,
        ascii: false,
        lock: HeldLock::None,
    };
    if session.start_transfer(task).is_err() {
        return session.answer(ReplyCode::FileActionNotTaken, "Another transfer is in progress");
    }
    Ok(CommandOutcome::Continue)
}

pub(crate) fn list(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    send_listing(session, command, false)
}

pub(crate) fn nlst(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    send_listing(session, command, true)
}

/// ABOR during a transfer raises the flag and slams the data socket;
/// the worker then owns the 426/226 sequence. With nothing running it
/// just discards residual data-channel state.
pub(crate) fn abor(session: &mut Session, _command: &ParsedCommand) -> io::Result<CommandOutcome> {
    match session.shared.transfer_state() {
        TransferState::Starting | TransferState::Running => {
            debug!(session = session.shared.id, "abort requested");
            session.shared.request_abort();
            Ok(CommandOutcome::Continue)
        }
        _ => {
            session.close_data_channel();
            session.answer(ReplyCode::DataConnectionIdle, "No transfer to abort")
        }
    }
}
