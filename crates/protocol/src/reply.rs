use std::fmt;

/// The three-digit reply codes this server emits.
///
/// The set is deliberately closed: handlers can only answer with a
/// code the protocol layer knows how to render, which keeps the wire
/// surface auditable in one place.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum ReplyCode {
    /// 120 Service ready in nnn minutes.
    ServiceReadySoon = 120,
    /// 125 Data connection already open; transfer starting.
    DataConnectionOpen = 125,
    /// 150 File status okay; about to open data connection.
    FileStatusOkay = 150,
    /// 200 Command okay.
    CommandOkay = 200,
    /// 211 System status reply.
    SystemStatus = 211,
    /// 213 File status reply (SIZE, MDTM).
    FileStatus = 213,
    /// 215 NAME system type.
    SystemType = 215,
    /// 220 Service ready for new user.
    ServiceReady = 220,
    /// 221 Service closing control connection.
    ServiceClosing = 221,
    /// 225 Data connection open; no transfer in progress.
    DataConnectionIdle = 225,
    /// 226 Closing data connection; transfer successful.
    ClosingDataConnection = 226,
    /// 227 Entering passive mode.
    EnteringPassiveMode = 227,
    /// 230 User logged in.
    UserLoggedIn = 230,
    /// 250 Requested file action okay, completed.
    FileActionOkay = 250,
    /// 257 "PATHNAME" created (or reported by PWD).
    PathnameCreated = 257,
    /// 331 User name okay, need password.
    NeedPassword = 331,
    /// 350 Requested file action pending further information.
    PendingFurtherInfo = 350,
    /// 421 Service not available, closing control connection.
    ServiceNotAvailable = 421,
    /// 425 Can't open data connection.
    CantOpenDataConnection = 425,
    /// 426 Connection closed; transfer aborted.
    TransferAborted = 426,
    /// 450 Requested file action not taken (file busy).
    FileActionNotTaken = 450,
    /// 451 Requested action aborted: local error in processing.
    LocalProcessingError = 451,
    /// 500 Syntax error, command unrecognized.
    SyntaxError = 500,
    /// 501 Syntax error in parameters or arguments.
    SyntaxErrorInArguments = 501,
    /// 502 Command not implemented.
    NotImplemented = 502,
    /// 503 Bad sequence of commands.
    BadCommandSequence = 503,
    /// 504 Command not implemented for that parameter.
    NotImplementedForParameter = 504,
    /// 530 Not logged in.
    NotLoggedIn = 530,
    /// 550 Requested action not taken (file unavailable).
    FileUnavailable = 550,
}

impl ReplyCode {
    /// Returns the numeric wire value of this code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// A reply ready to be serialized onto the control channel.
///
/// Single-line replies render as `NNN SP text CRLF`. Multi-line
/// replies render every line but the last as `NNN-text CRLF` and close
/// with a final line carrying the same code.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    code: ReplyCode,
    lines: Vec<String>,
}

impl Reply {
    /// Creates a single-line reply.
    #[must_use]
    pub fn new(code: ReplyCode, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// Creates a multi-line reply; `lines` must be non-empty and the
    /// last entry becomes the final (non-continuation) line.
    #[must_use]
    pub fn multi_line(code: ReplyCode, lines: Vec<String>) -> Self {
        debug_assert!(!lines.is_empty());
        Self { code, lines }
    }

    /// The reply code shared by every line.
    #[must_use]
    pub const fn code(&self) -> ReplyCode {
        self.code
    }

    /// Serializes the reply into control-channel bytes.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len().saturating_sub(1);
        for (index, line) in self.lines.iter().enumerate() {
            if index == last {
                out.push_str(&format_reply(self.code, line));
            } else {
                out.push_str(&format_reply_cont(self.code, line));
            }
        }
        out
    }
}

/// Formats a final reply line: `NNN SP text CRLF`.
#[must_use]
pub fn format_reply(code: ReplyCode, text: &str) -> String {
    format!("{} {text}\r\n", code.as_u16())
}

/// Formats a continuation line of a multi-line reply: `NNN-text CRLF`.
#[must_use]
pub fn format_reply_cont(code: ReplyCode, text: &str) -> String {
    format!("{}-{text}\r\n", code.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_wire_format() {
        let reply = Reply::new(ReplyCode::CommandOkay, "Command okay");
        assert_eq!(reply.to_wire(), "200 Command okay\r\n");
    }

    #[test]
    fn multi_line_wire_format() {
        let reply = Reply::multi_line(
            ReplyCode::SystemStatus,
            vec![
                "Features:".to_string(),
                " SIZE".to_string(),
                "End".to_string(),
            ],
        );
        assert_eq!(reply.to_wire(), "211-Features:\r\n211- SIZE\r\n211 End\r\n");
    }

    #[test]
    fn code_values_match_rfc_numbers() {
        assert_eq!(ReplyCode::FileStatusOkay.as_u16(), 150);
        assert_eq!(ReplyCode::ClosingDataConnection.as_u16(), 226);
        assert_eq!(ReplyCode::EnteringPassiveMode.as_u16(), 227);
        assert_eq!(ReplyCode::TransferAborted.as_u16(), 426);
        assert_eq!(ReplyCode::FileUnavailable.as_u16(), 550);
    }

    #[test]
    fn final_line_has_space_separator() {
        assert_eq!(
            format_reply(ReplyCode::NeedPassword, "Password required"),
            "331 Password required\r\n"
        );
        assert_eq!(
            format_reply_cont(ReplyCode::NeedPassword, "Password required"),
            "331-Password required\r\n"
        );
    }
}
