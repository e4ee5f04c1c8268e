#![deny(unsafe_code)]

use std::env;
use std::process::ExitCode;

use daemon::{run_daemon, DaemonConfig};

fn main() -> ExitCode {
    let config = match DaemonConfig::parse_from(env::args_os()) {
        Ok(Some(config)) => config,
        Ok(None) => return ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("ftpd: {error}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level.as_tracing_level())
        .with_target(false)
        .init();

    match run_daemon(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("ftpd: {error}");
            ExitCode::FAILURE
        }
    }
}
