use thiserror::Error;

/// Errors produced while decoding control-channel text.
///
/// Every variant corresponds to a malformed client input; the daemon
/// maps them onto 500/501 replies at the handler boundary.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProtocolError {
    /// The command line was empty or the verb was not 1..=8 ASCII letters.
    #[error("malformed command line: {0:?}")]
    BadCommandLine(String),

    /// A PORT argument did not parse as `h1,h2,h3,h4,p1,p2`.
    #[error("malformed host-port argument: {0:?}")]
    BadHostPort(String),

    /// A TYPE argument named an unknown representation type.
    #[error("unknown transfer type: {0:?}")]
    BadTransferType(String),

    /// A MODE argument named an unknown transfer mode.
    #[error("unknown transfer mode: {0:?}")]
    BadTransferMode(String),

    /// A STRU argument named an unknown file structure.
    #[error("unknown file structure: {0:?}")]
    BadFileStructure(String),

    /// A REST argument was not a non-negative decimal integer.
    #[error("malformed restart offset: {0:?}")]
    BadRestartOffset(String),
}
