use crate::error::ProtocolError;

/// Maximum accepted verb length in characters.
pub const MAX_VERB_LEN: usize = 8;

/// A single control-channel command split into verb and argument.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedCommand {
    /// The command verb, uppercased.
    pub verb: String,
    /// The raw argument text; empty when the client sent none.
    pub argument: String,
    /// Whether a non-empty argument followed the verb.
    pub has_argument: bool,
}

impl ParsedCommand {
    /// Convenience constructor used by tests and the dispatcher.
    #[must_use]
    pub fn new(verb: &str, argument: &str) -> Self {
        Self {
            verb: verb.to_ascii_uppercase(),
            argument: argument.to_string(),
            has_argument: !argument.is_empty(),
        }
    }
}

/// Parses one CRLF-terminated control line into a [`ParsedCommand`].
///
/// The trailing CRLF (or bare LF) is stripped, surrounding whitespace
/// is trimmed, and the verb is validated as 1..=[`MAX_VERB_LEN`] ASCII
/// letters before being uppercased. The argument is everything after
/// the first space, taken verbatim so that filenames containing spaces
/// survive.
pub fn parse_command(line: &str) -> Result<ParsedCommand, ProtocolError> {
    let stripped = line
        .strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line);
    let trimmed = stripped.trim();

    let (verb, argument) = match trimmed.split_once(' ') {
        Some((verb, rest)) => (verb, rest),
        None => (trimmed, ""),
    };

    if verb.is_empty()
        || verb.len() > MAX_VERB_LEN
        || !verb.bytes().all(|b| b.is_ascii_alphabetic())
    {
        return Err(ProtocolError::BadCommandLine(trimmed.to_string()));
    }

    Ok(ParsedCommand {
        verb: verb.to_ascii_uppercase(),
        argument: argument.to_string(),
        has_argument: !argument.is_empty(),
    })
}
