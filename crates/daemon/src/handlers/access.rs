//! Login, logout, and session reset verbs.

use std::io;

use protocol::{ParsedCommand, ReplyCode};
use tracing::info;

use crate::registry::CommandOutcome;
use crate::session::{Session, SessionState};
use crate::users::ANONYMOUS;

pub(crate) fn user(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "USER requires a user name");
    }
    let name = command.argument.trim();

    let Some(account) = session.store.lookup(name) else {
        return session.answer(ReplyCode::NotLoggedIn, "User unknown");
    };

    session.set_user(name);
    if account.name == ANONYMOUS && account.password_digest.is_none() {
        session.answer(
            ReplyCode::NeedPassword,
            "Anonymous login OK, send your email as password",
        )
    } else {
        session.answer(
            ReplyCode::NeedPassword,
            &format!("Password required for {name}"),
        )
    }
}

pub(crate) fn pass(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if session.state != SessionState::AwaitingPassword {
        return session.answer(ReplyCode::BadCommandSequence, "Send USER first");
    }
    if session.authenticate(&command.argument) {
        info!(session = session.shared.id, peer = %session.shared.peer, "login");
        session.answer(ReplyCode::UserLoggedIn, "User logged in, proceed")
    } else {
        session.answer(ReplyCode::NotLoggedIn, "Login incorrect")
    }
}

pub(crate) fn quit(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "QUIT takes no argument");
    }

    // An in-flight transfer finishes (and sends its own final reply)
    // before the goodbye goes out.
    session.join_transfer();

    if session.state == SessionState::Authenticated {
        let stats = session.shared.stats.snapshot();
        let duration = session.connect_time.elapsed().as_secs();
        session.reply_lines(
            ReplyCode::ServiceClosing,
            vec![
                String::from("Goodbye. Session statistics:"),
                format!("Files uploaded: {}", stats.files_uploaded),
                format!("Bytes uploaded: {}", stats.bytes_uploaded),
                format!("Files downloaded: {}", stats.files_downloaded),
                format!("Bytes downloaded: {}", stats.bytes_downloaded),
                format!("Session duration: {duration}s"),
                String::from("Closing connection"),
            ],
        )?;
    } else {
        session.reply(ReplyCode::ServiceClosing, "Closing connection")?;
    }
    Ok(CommandOutcome::Close)
}

pub(crate) fn rein(session: &mut Session, _command: &ParsedCommand) -> io::Result<CommandOutcome> {
    session.reinitialize();
    session.answer(ReplyCode::ServiceReady, "Service ready for new user")
}
