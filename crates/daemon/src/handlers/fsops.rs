//! File and directory manipulation verbs.

use std::io;

use chrono::{DateTime, Utc};
use protocol::{ParsedCommand, ReplyCode};
use tracing::debug;
use vfs::{fs as vfsfs, Resolved, VfsError};

use crate::registry::CommandOutcome;
use crate::session::Session;
use crate::users::Permissions;

const BUSY_WRITING: &str = "File is currently being written to, please try again later";
const BUSY_READING: &str = "File is currently being read, please try again later";

/// Maps a resolution failure onto its reply text.
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

pub(crate) fn dele(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "DELE requires a file name");
    }
    let resolved = match resolve_or_deny(session, &command.argument) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&resolved.virtual_path, Permissions::DELETE) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    if !vfsfs::exists(&resolved.physical) {
        return session.answer(ReplyCode::FileUnavailable, "No such file");
    }
    if vfsfs::is_dir(&resolved.physical) {
        return session.answer(ReplyCode::FileUnavailable, "Is a directory; use RMD");
    }

    if session.locks.is_exclusive_locked(&resolved.physical) {
        return session.answer(ReplyCode::FileActionNotTaken, BUSY_WRITING);
    }
    if session.locks.shared_count(&resolved.physical) > 0 {
        return session.answer(ReplyCode::FileActionNotTaken, BUSY_READING);
    }

    let guard = session.locks.acquire_exclusive(&resolved.physical);
    if !vfsfs::exists(&resolved.physical) {
        drop(guard);
        return session.answer(ReplyCode::FileUnavailable, "No such file");
    }
    let outcome = match vfsfs::delete_file(&resolved.physical) {
        Ok(()) => {
            debug!(session = session.shared.id, path = %resolved.virtual_path, "deleted");
            session.answer(ReplyCode::FileActionOkay, "File deleted")
        }
        Err(_) => session.answer(ReplyCode::FileUnavailable, "Failed to delete file"),
    };
    drop(guard);
    outcome
}

pub(crate) fn rmd(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "RMD requires a directory");
    }
    let resolved = match resolve_or_deny(session, &command.argument) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&resolved.virtual_path, Permissions::RMDIR) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    match vfsfs::delete_dir(&resolved.physical, true) {
        Ok(()) => session.answer(ReplyCode::FileActionOkay, "Directory removed"),
        Err(VfsError::NotFound(_)) => {
            session.answer(ReplyCode::FileUnavailable, "No such directory")
        }
        Err(VfsError::NotADirectory(_)) => {
            session.answer(ReplyCode::FileUnavailable, "Not a directory")
        }
        Err(_) => session.answer(ReplyCode::FileUnavailable, "Failed to remove directory"),
    }
}

pub(crate) fn mkd(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "MKD requires a directory");
    }
    let resolved = match resolve_or_deny(session, &command.argument) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&resolved.virtual_path, Permissions::MKDIR) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    if vfsfs::exists(&resolved.physical) {
        return session.answer(ReplyCode::FileUnavailable, "Already exists");
    }
    match vfsfs::create_dir(&resolved.physical) {
        Ok(()) => session.answer(
            ReplyCode::PathnameCreated,
            &format!("\"{}\" created", resolved.virtual_path),
        ),
        Err(_) => session.answer(ReplyCode::FileUnavailable, "Failed to create directory"),
    }
}

pub(crate) fn rnfr(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "RNFR requires a path");
    }
    let resolved = match resolve_or_deny(session, &command.argument) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&resolved.virtual_path, Permissions::RENAME) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    if !vfsfs::exists(&resolved.physical) {
        return session.answer(ReplyCode::FileUnavailable, "No such file or directory");
    }

    if session.locks.is_exclusive_locked(&resolved.physical)
        || session.locks.shared_count(&resolved.physical) > 0
    {
        return session.answer(ReplyCode::FileActionNotTaken, BUSY_WRITING);
    }
    // Quiescence probe: hold the exclusive lock for an instant so a
    // transfer that slipped past the inspectors is waited out.
    drop(session.locks.acquire_exclusive(&resolved.physical));

    session.set_rename_from(resolved);
    session.answer(ReplyCode::PendingFurtherInfo, "Ready for RNTO")
}

pub(crate) fn rnto(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "RNTO requires a path");
    }
    let Some(source) = session.take_rename_from() else {
        return session.answer(
            ReplyCode::BadCommandSequence,
            "Bad sequence of commands (use RNFR first)",
        );
    };
    let destination = match resolve_or_deny(session, &command.argument) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&destination.virtual_path, Permissions::RENAME) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    if vfsfs::exists(&destination.physical) {
        return session.answer(ReplyCode::FileUnavailable, "Destination already exists");
    }

    let guard = session.locks.acquire_exclusive(&source.physical);
    if !vfsfs::exists(&source.physical) {
        drop(guard);
        return session.answer(ReplyCode::FileUnavailable, "No such file or directory");
    }
    let outcome = match vfsfs::rename(&source.physical, &destination.physical) {
        Ok(()) => {
            debug!(
                session = session.shared.id,
                from = %source.virtual_path,
                to = %destination.virtual_path,
                "renamed"
            );
            session.answer(ReplyCode::FileActionOkay, "Rename successful")
        }
        Err(_) => session.answer(ReplyCode::FileUnavailable, "Rename failed"),
    };
    drop(guard);
    outcome
}

pub(crate) fn size(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "SIZE requires a file name");
    }
    let resolved = match resolve_or_deny(session, &command.argument) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&resolved.virtual_path, Permissions::READ) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    if !vfsfs::exists(&resolved.physical) || vfsfs::is_dir(&resolved.physical) {
        return session.answer(ReplyCode::FileUnavailable, "Not a regular file");
    }

    let guard = session.locks.acquire_shared(&resolved.physical);
    let result = vfsfs::size(&resolved.physical);
    drop(guard);
    match result {
        Ok(bytes) => session.answer(ReplyCode::FileStatus, &bytes.to_string()),
        Err(_) => session.answer(ReplyCode::FileUnavailable, "Not a regular file"),
    }
}

pub(crate) fn mdtm(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "MDTM requires a file name");
    }
    let resolved = match resolve_or_deny(session, &command.argument) {
        Ok(resolved) => resolved,
        Err((code, text)) => return session.answer(code, text),
    };
    if !session.check_access(&resolved.virtual_path, Permissions::READ) {
        return session.answer(ReplyCode::FileUnavailable, "Permission denied");
    }
    match vfsfs::mtime(&resolved.physical) {
        Ok(mtime) => {
            let stamp = DateTime::<Utc>::from(mtime).format("%Y%m%d%H%M%S");
            session.answer(ReplyCode::FileStatus, &stamp.to_string())
        }
        Err(_) => session.answer(ReplyCode::FileUnavailable, "No such file or directory"),
    }
}
