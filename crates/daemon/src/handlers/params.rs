//! Transfer-parameter and data-channel negotiation verbs.

use std::io;

use protocol::{
    format_pasv_reply, parse_host_port, parse_mode, parse_restart_offset, parse_structure,
    parse_transfer_type, FileStructure, ParsedCommand, ReplyCode, TransferMode, TransferType,
};

use crate::registry::CommandOutcome;
use crate::session::Session;

pub(crate) fn port(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "PORT requires an address");
    }
    let Ok(host_port) = parse_host_port(&command.argument) else {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "Malformed PORT argument");
    };
    session.set_active(host_port.addr, host_port.port);
    session.answer(ReplyCode::CommandOkay, "PORT command successful")
}

pub(crate) fn pasv(session: &mut Session, _command: &ParsedCommand) -> io::Result<CommandOutcome> {
    match session.set_passive() {
        Ok((addr, port)) => {
            session.reply_raw(&format_pasv_reply(addr, port))?;
            Ok(CommandOutcome::Continue)
        }
        Err(_) => session.answer(
            ReplyCode::CantOpenDataConnection,
            "Cannot enter passive mode",
        ),
    }
}

pub(crate) fn transfer_type(
    session: &mut Session,
    command: &ParsedCommand,
) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "TYPE requires an argument");
    }
    match parse_transfer_type(&command.argument) {
        Ok(TransferType::Ascii) => {
            session.transfer_type = TransferType::Ascii;
            session.answer(ReplyCode::CommandOkay, "Type set to A")
        }
        Ok(TransferType::Binary) => {
            session.transfer_type = TransferType::Binary;
            session.answer(ReplyCode::CommandOkay, "Type set to I")
        }
        Ok(TransferType::Ebcdic) => session.answer(
            ReplyCode::NotImplementedForParameter,
            "EBCDIC type not supported",
        ),
        Err(_) => session.answer(ReplyCode::SyntaxErrorInArguments, "Unknown TYPE argument"),
    }
}

pub(crate) fn structure(
    session: &mut Session,
    command: &ParsedCommand,
) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "STRU requires an argument");
    }
    match parse_structure(&command.argument) {
        Ok(FileStructure::File) => {
            session.structure = FileStructure::File;
            session.answer(ReplyCode::CommandOkay, "Structure set to F")
        }
        Ok(_) => session.answer(
            ReplyCode::NotImplementedForParameter,
            "Only file structure is supported",
        ),
        Err(_) => session.answer(ReplyCode::SyntaxErrorInArguments, "Unknown STRU argument"),
    }
}

pub(crate) fn mode(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "MODE requires an argument");
    }
    match parse_mode(&command.argument) {
        Ok(TransferMode::Stream) => {
            session.transfer_mode = TransferMode::Stream;
            session.answer(ReplyCode::CommandOkay, "Mode set to S")
        }
        Ok(_) => session.answer(
            ReplyCode::NotImplementedForParameter,
            "Only stream mode is supported",
        ),
        Err(_) => session.answer(ReplyCode::SyntaxErrorInArguments, "Unknown MODE argument"),
    }
}

pub(crate) fn rest(session: &mut Session, command: &ParsedCommand) -> io::Result<CommandOutcome> {
    if !command.has_argument {
        return session.answer(ReplyCode::SyntaxErrorInArguments, "REST requires an offset");
    }
    let Ok(offset) = parse_restart_offset(&command.argument) else {
        return session.answer(
            ReplyCode::SyntaxErrorInArguments,
            "REST requires a non-negative integer",
        );
    };
    session.set_rest(offset);
    session.answer(
        ReplyCode::PendingFurtherInfo,
        &format!("Restarting at {offset}. Send STOR or RETR to resume"),
    )
}
