//! Informational and no-op verbs.

use std::io;

use protocol::{FileStructure, ParsedCommand, ReplyCode, TransferMode, TransferType};

use crate::registry::CommandOutcome;
use crate::session::Session;

pub(crate) fn syst(session: &mut Session, _command: &ParsedCommand) -> io::Result<CommandOutcome> {
    session.answer(ReplyCode::SystemType, "UNIX Type: L8")
}

pub(crate) fn noop(session: &mut Session, _command: &ParsedCommand) -> io::Result<CommandOutcome> {
    session.answer(ReplyCode::CommandOkay, "NOOP command successful")
}

pub(crate) fn not_implemented(
    session: &mut Session,
    _command: &ParsedCommand,
) -> io::Result<CommandOutcome> {
    session.answer(ReplyCode::NotImplemented, "Command not implemented")
}

/// FEAT's feature lines carry no code prefix, so the block is written
/// out verbatim rather than through the multi-line formatter.
pub(crate) fn feat(session: &mut Session, _command: &ParsedCommand) -> io::Result<CommandOutcome> {
    session.reply_raw("211-Features:\r\n SIZE\r\n MDTM\r\n REST STREAM\r\n211 End\r\n")?;
    Ok(CommandOutcome::Continue)
}

pub(crate) fn stat(session: &mut Session, _command: &ParsedCommand) -> io::Result<CommandOutcome> {
    let user = session
        .user
        .as_ref()
        .map_or_else(|| String::from("(none)"), |user| user.name.clone());
    let type_name = match session.transfer_type {
        TransferType::Ascii => "A",
        TransferType::Binary => "I",
        TransferType::Ebcdic => "E",
    };
    let mode_name = match session.transfer_mode {
        TransferMode::Stream => "S",
        TransferMode::Block => "B",
        TransferMode::Compressed => "C",
    };
    let structure_name = match session.structure {
        FileStructure::File => "F",
        FileStructure::Record => "R",
        FileStructure::Page => "P",
    };
    let stats = session.shared.stats.snapshot();

    session.reply_lines(
        ReplyCode::SystemStatus,
        vec![
            String::from("FTP server status:"),
            format!("Logged in as {user}"),
            format!("TYPE: {type_name}, MODE: {mode_name}, STRU: {structure_name}"),
            format!("Data connection: {}", session.data_mode_name()),
            format!(
                "Transfers: {} up ({} bytes), {} down ({} bytes)",
                stats.files_uploaded,
                stats.bytes_uploaded,
                stats.files_downloaded,
                stats.bytes_downloaded
            ),
            String::from("End of status"),
        ],
    )?;
    Ok(CommandOutcome::Continue)
}
