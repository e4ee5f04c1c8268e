use std::net::Ipv4Addr;

use crate::error::ProtocolError;

/// A decoded PORT argument: the peer's IPv4 address and data port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostPort {
    /// The address the server must connect to for active-mode data.
    pub addr: Ipv4Addr,
    /// The TCP port, reassembled from the high and low octets.
    pub port: u16,
}

/// Parses the PORT argument form `h1,h2,h3,h4,p1,p2`.
///
/// All six fields must be decimal octets in `0..=255`; the port is
/// `p1 * 256 + p2`.
pub fn parse_host_port(argument: &str) -> Result<HostPort, ProtocolError> {
    let bad = || ProtocolError::BadHostPort(argument.to_string());

    let mut octets = [0u8; 6];
    let mut count = 0;
    for field in argument.trim().split(',') {
        if count == 6 {
            return Err(bad());
        }
        octets[count] = field.trim().parse::<u8>().map_err(|_| bad())?;
        count += 1;
    }
    if count != 6 {
        return Err(bad());
    }

    Ok(HostPort {
        addr: Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
        port: u16::from(octets[4]) << 8 | u16::from(octets[5]),
    })
}

/// Formats the complete 227 reply advertising a passive-mode endpoint.
#[must_use]
pub fn format_pasv_reply(addr: Ipv4Addr, port: u16) -> String {
    let [h1, h2, h3, h4] = addr.octets();
    format!(
        "227 Entering Passive Mode ({h1},{h2},{h3},{h4},{},{})\r\n",
        port >> 8,
        port & 0xff
    )
}

/// Representation type negotiated with TYPE.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TransferType {
    /// ASCII with LF/CRLF translation (`A`, `A N`). The default.
    #[default]
    Ascii,
    /// Image/binary, bytes verbatim (`I`).
    Binary,
    /// EBCDIC (`E`, `E N`); parsed so the handler can reject it with 504.
    Ebcdic,
}

/// Parses a TYPE argument. `A`/`A N` select ASCII, `I` binary, and
/// `E`/`E N` EBCDIC; anything else is a syntax error.
pub fn parse_transfer_type(argument: &str) -> Result<TransferType, ProtocolError> {
    match argument.trim().to_ascii_uppercase().as_str() {
        "A" | "A N" => Ok(TransferType::Ascii),
        "I" => Ok(TransferType::Binary),
        "E" | "E N" => Ok(TransferType::Ebcdic),
        _ => Err(ProtocolError::BadTransferType(argument.to_string())),
    }
}

/// Transfer mode negotiated with MODE.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TransferMode {
    /// Stream mode (`S`). The default and the only mode honored.
    #[default]
    Stream,
    /// Block mode (`B`); rejected upstream with 504.
    Block,
    /// Compressed mode (`C`); rejected upstream with 504.
    Compressed,
}

/// Parses a MODE argument.
pub fn parse_mode(argument: &str) -> Result<TransferMode, ProtocolError> {
    match argument.trim().to_ascii_uppercase().as_str() {
        "S" => Ok(TransferMode::Stream),
        "B" => Ok(TransferMode::Block),
        "C" => Ok(TransferMode::Compressed),
        _ => Err(ProtocolError::BadTransferMode(argument.to_string())),
    }
}

/// File structure negotiated with STRU.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FileStructure {
    /// File structure (`F`). The default and the only structure honored.
    #[default]
    File,
    /// Record structure (`R`); rejected upstream with 504.
    Record,
    /// Page structure (`P`); rejected upstream with 504.
    Page,
}

/// Parses a STRU argument.
pub fn parse_structure(argument: &str) -> Result<FileStructure, ProtocolError> {
    match argument.trim().to_ascii_uppercase().as_str() {
        "F" => Ok(FileStructure::File),
        "R" => Ok(FileStructure::Record),
        "P" => Ok(FileStructure::Page),
        _ => Err(ProtocolError::BadFileStructure(argument.to_string())),
    }
}

/// Parses a REST argument as a non-negative byte offset.
pub fn parse_restart_offset(argument: &str) -> Result<u64, ProtocolError> {
    let trimmed = argument.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::BadRestartOffset(argument.to_string()));
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| ProtocolError::BadRestartOffset(argument.to_string()))
}
