//! Verb dispatch table with per-command preflight hooks.
//!
//! Preflight is not an access check: it only clears latent REST and
//! RNFR state so a stray earlier command cannot leak into a later
//! one (a PWD between RNFR and RNTO must break the rename sequence).
//! Authentication gating happens at dispatch before the preflight,
//! and each handler produces its own replies.

use std::io;

use protocol::{ParsedCommand, ReplyCode};
use rustc_hash::FxHashMap;

use crate::handlers;
use crate::session::{Session, SessionState};

/// What the session loop should do after a command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandOutcome {
    /// Keep reading commands.
    Continue,
    /// QUIT was processed; close the control connection.
    Close,
}

/// Latent-state clearing performed before a handler runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Preflight {
    /// Leave REST and RNFR alone (NOOP, SIZE, MDTM).
    None,
    /// Clear only the restart offset (RNTO).
    ClearRestart,
    /// Clear only the rename source (REST, STOR, RETR).
    ClearRenameFrom,
    /// Clear both latches (everything else).
    ClearBoth,
}

impl Preflight {
    fn apply(self, session: &mut Session) {
        match self {
            Self::None => {}
            Self::ClearRestart => {
                session.rest_offset = 0;
            }
            Self::ClearRenameFrom => {
                session.rename_from = None;
            }
            Self::ClearBoth => {
                session.rest_offset = 0;
                session.rename_from = None;
            }
        }
    }
}

/// A command handler: replies on the control channel and reports how
/// to proceed. `Err` means the control stream itself failed.
pub type Handler = fn(&mut Session, &ParsedCommand) -> io::Result<CommandOutcome>;

struct CommandSpec {
    preflight: Preflight,
    handler: Handler,
}

/// The verb dispatch table; built once at startup, then read-only.
pub struct CommandRegistry {
    map: FxHashMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    /// Registers a verb; re-registration replaces the previous entry.
    pub fn register(&mut self, verb: &'static str, preflight: Preflight, handler: Handler) {
        self.map.insert(verb, CommandSpec { preflight, handler });
    }

    /// The preflight configured for `verb`, if registered.
    #[must_use]
    pub fn preflight_of(&self, verb: &str) -> Option<Preflight> {
        self.map.get(verb).map(|spec| spec.preflight)
    }

    /// Builds the standard verb table.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self {
            map: FxHashMap::default(),
        };
        handlers::register_all(&mut registry);
        registry
    }

    /// Dispatches one parsed command.
    pub fn dispatch(
        &self,
        session: &mut Session,
        command: &ParsedCommand,
    ) -> io::Result<CommandOutcome> {
        let Some(spec) = self.map.get(command.verb.as_str()) else {
            return session.answer(ReplyCode::NotImplemented, "Command not implemented");
        };

        if let Some((code, text)) = state_gate(session.state, &command.verb) {
            return session.answer(code, text);
        }

        spec.preflight.apply(session);
        (spec.handler)(session, command)
    }
}

/// Commands permitted before authentication completes.
fn state_gate(state: SessionState, verb: &str) -> Option<(ReplyCode, &'static str)> {
    match state {
        SessionState::Authenticated => None,
        SessionState::Connected => match verb {
            "USER" | "QUIT" | "NOOP" => None,
            _ => Some((ReplyCode::NotLoggedIn, "Please login with USER and PASS")),
        },
        SessionState::AwaitingPassword => match verb {
            "USER" | "PASS" | "QUIT" | "NOOP" => None,
            _ => Some((
                ReplyCode::BadCommandSequence,
                "Send PASS to complete the login",
            )),
        },
        SessionState::Closing => Some((
            ReplyCode::ServiceNotAvailable,
            "Service closing control connection",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The authoritative preflight assignments.
    #[test]
    fn preflight_table_matches_design() {
        let registry = CommandRegistry::standard();

        for verb in [
            "USER", "PASS", "ACCT", "CWD", "CDUP", "SMNT", "QUIT", "REIN", "PORT", "PASV",
            "TYPE", "STRU", "MODE", "APPE", "LIST", "NLST", "DELE", "RMD", "MKD", "PWD",
            "ABOR", "SYST",
        ] {
            assert_eq!(
                registry.preflight_of(verb),
                Some(Preflight::ClearBoth),
                "verb {verb}"
            );
        }
        for verb in ["REST", "STOR", "RETR"] {
            assert_eq!(
                registry.preflight_of(verb),
                Some(Preflight::ClearRenameFrom),
                "verb {verb}"
            );
        }
        assert_eq!(registry.preflight_of("RNTO"), Some(Preflight::ClearRestart));
        assert_eq!(registry.preflight_of("NOOP"), Some(Preflight::None));
    }

    #[test]
    fn extension_verbs_leave_transfer_state_alone() {
        let registry = CommandRegistry::standard();
        assert_eq!(registry.preflight_of("SIZE"), Some(Preflight::None));
        assert_eq!(registry.preflight_of("MDTM"), Some(Preflight::None));
        assert_eq!(registry.preflight_of("FEAT"), Some(Preflight::None));
    }

    #[test]
    fn unknown_verbs_are_unregistered() {
        let registry = CommandRegistry::standard();
        assert_eq!(registry.preflight_of("STOU"), None);
        assert_eq!(registry.preflight_of("SITE"), None);
        assert_eq!(registry.preflight_of("HELP"), None);
    }

    #[test]
    fn rnfr_is_registered_and_clears_both() {
        let registry = CommandRegistry::standard();
        assert_eq!(registry.preflight_of("RNFR"), Some(Preflight::ClearBoth));
    }
}
