//! Directory navigation verbs.

use std::io;

use protocol::{ParsedCommand, ReplyCode};

use crate::registry::CommandOutcome;
use crate::session::Session;
use crate::users::Permissions;

pub(crate) fn cwd(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "CWD requires a directory");
    }
    let Ok(resolved) = session.resolve(&command.argument) else {
        return session.answer(ReplyCode::FileUnavailable, "Failed to change directory");
    };
    if !session.check_access(&resolved.virtual_path, Permissions::READ) {
        return session.answer(ReplyCode::FileUnavailable, "Failed to change directory");
    }
    if session.change_directory(&resolved) {
        session.answer(
            ReplyCode::FileActionOkay,
            &format!("Directory changed to \"{}\"", session.cwd),
        )
    } else {
        session.answer(ReplyCode::FileUnavailable, "Failed to change directory")
    }
}

pub(crate) fn cdup(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "CDUP takes no argument");
    }
    let resolved = session.resolve_trusted("..");
    if !session.check_access(&resolved.virtual_path, Permissions::READ) {
        return session.answer(ReplyCode::FileUnavailable, "Failed to change directory");
    }
    if session.change_directory(&resolved) {
        session.answer(
            ReplyCode::FileActionOkay,
            &format!("Directory changed to \"{}\"", session.cwd),
        )
    } else {
        session.answer(ReplyCode::FileUnavailable, "Failed to change directory")
    }
}

pub(crate) fn pwd(session: &mut Session, _command: &ParsedCommand) -> io::Result<CommandOutcome> {
    let cwd = session.cwd.clone();
    session.answer(
        ReplyCode::PathnameCreated,
        &format!("\"{cwd}\" is current directory"),
    )
}
