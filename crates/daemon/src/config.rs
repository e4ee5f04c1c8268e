use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use transport::AddrFamily;

use crate::error::DaemonError;

/// Address-family choice exposed on the CLI.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AddrFamilyArg {
    /// IPv4 only.
    Ipv4,
    /// IPv6 only.
    Ipv6,
    /// Whatever the platform offers; dual stack preferred.
    #[default]
    Unspec,
}

impl AddrFamilyArg {
    fn parse(text: &str) -> Result<Self, String> {
        match text.to_ascii_lowercase().as_str() {
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            "unspec" => Ok(Self::Unspec),
            other => Err(format!("unknown address family {other:?}")),
        }
    }

    /// Maps the CLI choice onto the transport-level family.
    #[must_use]
    pub const fn as_family(self) -> AddrFamily {
        match self {
            Self::Ipv4 => AddrFamily::V4,
            Self::Ipv6 => AddrFamily::V6,
            Self::Unspec => AddrFamily::Unspec,
        }
    }
}

/// Log-severity choice exposed on the CLI.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogLevelArg {
    /// Everything, including per-command traces.
    Debug,
    /// Normal operational logging.
    #[default]
    Info,
    /// Only anomalies.
    Warn,
    /// Only failures.
    Error,
}

impl LogLevelArg {
    fn parse(text: &str) -> Result<Self, String> {
        match text.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown log level {other:?}")),
        }
    }

    /// The equivalent `tracing` level.
    #[must_use]
    pub const fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Fully resolved daemon configuration.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Control-connection listen port.
    pub port: u16,
    /// Listener address family.
    pub family: AddrFamilyArg,
    /// Physical sandbox root; created at startup when missing.
    pub root: PathBuf,
    /// Log severity threshold.
    pub log_level: LogLevelArg,
    /// Connection cap; `None` is unlimited.
    pub max_connections: Option<usize>,
    /// Path of the user database; silently optional.
    pub users_file: PathBuf,
    /// Whether `USER anonymous` is accepted.
    pub anonymous_enabled: bool,
    /// Virtual home assigned to anonymous logins.
    pub anonymous_home: String,
    /// Control-channel idle timeout.
    pub idle_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: 21,
            family: AddrFamilyArg::Unspec,
            root: PathBuf::from("./ftp_root"),
            log_level: LogLevelArg::Info,
            max_connections: Some(100),
            users_file: PathBuf::from("users.db"),
            anonymous_enabled: true,
            anonymous_home: String::from("/pub"),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

fn cli() -> Command {
    Command::new("ftpd")
        .about("Multi-user FTP server")
        .disable_version_flag(true)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Control-connection port [default: 21]"),
        )
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .help("Server root directory, created if missing [default: ./ftp_root]"),
        )
        .arg(
            Arg::new("addr")
                .short('a')
                .long("addr")
                .value_name("FAMILY")
                .help("Address family: ipv4, ipv6, or unspec [default: unspec]"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .value_name("LEVEL")
                .help("Log level: DEBUG, INFO, WARN, or ERROR [default: INFO]"),
        )
        .arg(
            Arg::new("max-connections")
                .short('c')
                .value_name("MAX_CONN")
                .allow_hyphen_values(true)
                .help("Connection cap; -1 for unlimited [default: 100]"),
        )
        .arg(
            Arg::new("users")
                .short('u')
                .long("users")
                .value_name("FILE")
                .help("User database file [default: users.db]"),
        )
        .arg(
            Arg::new("anonymous-root")
                .long("anonymous-root")
                .value_name("DIR")
                .help("Virtual home for anonymous logins [default: /pub]"),
        )
        .arg(
            Arg::new("no-anonymous")
                .long("no-anonymous")
                .action(ArgAction::SetTrue)
                .help("Refuse anonymous logins"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .help("Control-channel idle timeout in seconds [default: 300]"),
        )
}

impl DaemonConfig {
    /// Parses the daemon command line.
    ///
    /// `Ok(None)` means help was requested and printed; the caller
    /// should exit 0. Unknown flags and malformed values come back as
    /// [`DaemonError::InvalidArguments`] for an exit-1 path.
    pub fn parse_from<I>(args: I) -> Result<Option<Self>, DaemonError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let matches = match cli().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(error)
                if matches!(
                    error.kind(),
                    clap::error::ErrorKind::DisplayHelp
                        | clap::error::ErrorKind::DisplayVersion
                ) =>
            {
                let _ = error.print();
                return Ok(None);
            }
            Err(error) => {
                return Err(DaemonError::InvalidArguments(error.to_string()));
            }
        };

        let mut config = Self::default();
        let invalid = |message: String| DaemonError::InvalidArguments(message);

        if let Some(text) = matches.get_one::<String>("port") {
            config.port = text
                .parse::<u16>()
                .map_err(|_| invalid(format!("invalid port {text:?}")))?;
        }
        if let Some(text) = matches.get_one::<String>("root") {
            config.root = PathBuf::from(text);
        }
        if let Some(text) = matches.get_one::<String>("addr") {
            config.family = AddrFamilyArg::parse(text).map_err(invalid)?;
        }
        if let Some(text) = matches.get_one::<String>("log-level") {
            config.log_level = LogLevelArg::parse(text).map_err(invalid)?;
        }
        if let Some(text) = matches.get_one::<String>("max-connections") {
            let value = text
                .parse::<i64>()
                .map_err(|_| invalid(format!("invalid connection cap {text:?}")))?;
            config.max_connections = if value > 0 {
                Some(value as usize)
            } else {
                None
            };
        }
        if let Some(text) = matches.get_one::<String>("users") {
            config.users_file = PathBuf::from(text);
        }
        if let Some(text) = matches.get_one::<String>("anonymous-root") {
            if !text.starts_with('/') {
                return Err(invalid(format!(
                    "anonymous root must be a virtual absolute path, got {text:?}"
                )));
            }
            config.anonymous_home = text.clone();
        }
        if matches.get_flag("no-anonymous") {
            config.anonymous_enabled = false;
        }
        if let Some(text) = matches.get_one::<String>("timeout") {
            let secs = text
                .parse::<u64>()
                .map_err(|_| invalid(format!("invalid timeout {text:?}")))?;
            config.idle_timeout = Duration::from_secs(secs);
        }

        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<DaemonConfig>, DaemonError> {
        let mut full = vec![OsString::from("ftpd")];
        full.extend(args.iter().map(OsString::from));
        DaemonConfig::parse_from(full)
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse(&[]).expect("parse").expect("config");
        assert_eq!(config.port, 21);
        assert_eq!(config.root, PathBuf::from("./ftp_root"));
        assert_eq!(config.family, AddrFamilyArg::Unspec);
        assert_eq!(config.log_level, LogLevelArg::Info);
        assert_eq!(config.max_connections, Some(100));
        assert!(config.anonymous_enabled);
        assert_eq!(config.anonymous_home, "/pub");
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "-p", "2121", "-r", "/srv/ftp", "-a", "ipv4", "-l", "DEBUG", "-c", "5",
        ])
        .expect("parse")
        .expect("config");
        assert_eq!(config.port, 2121);
        assert_eq!(config.root, PathBuf::from("/srv/ftp"));
        assert_eq!(config.family, AddrFamilyArg::Ipv4);
        assert_eq!(config.log_level, LogLevelArg::Debug);
        assert_eq!(config.max_connections, Some(5));
    }

    #[test]
    fn negative_cap_means_unlimited() {
        let config = parse(&["-c", "-1"]).expect("parse").expect("config");
        assert_eq!(config.max_connections, None);
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(matches!(
            parse(&["--frobnicate"]),
            Err(DaemonError::InvalidArguments(_))
        ));
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(parse(&["-p", "notaport"]).is_err());
        assert!(parse(&["-p", "70000"]).is_err());
    }

    #[test]
    fn anonymous_can_be_disabled() {
        let config = parse(&["--no-anonymous"]).expect("parse").expect("config");
        assert!(!config.anonymous_enabled);
    }

    #[test]
    fn log_level_is_case_insensitive() {
        let config = parse(&["-l", "warn"]).expect("parse").expect("config");
        assert_eq!(config.log_level, LogLevelArg::Warn);
    }
}
