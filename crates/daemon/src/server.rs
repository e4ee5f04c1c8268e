//! The accept loop: connection admission, session threads, shutdown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use protocol::{format_reply, parse_command, ReplyCode};
use tracing::{debug, info, warn};
use transport::{Listener, TransportError};
use vfs::locks::LockTable;

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::registry::{CommandOutcome, CommandRegistry};
use crate::session::Session;
use crate::signals;
use crate::users::UserStore;

/// How often the accept loop wakes to poll the shutdown flag.
const ACCEPT_TICK: Duration = Duration::from_millis(500);

/// Listen backlog for the control port.
const BACKLOG: i32 = 128;

/// Counts live sessions against the configured cap.
///
/// The counter sits behind a mutex and hands out RAII permits; a
/// permit dropped by an exiting session thread frees its slot.
#[derive(Debug)]
struct ConnectionLimiter {
    max: Option<usize>,
    count: Mutex<usize>,
}

impl ConnectionLimiter {
    fn new(max: Option<usize>) -> Self {
        Self {
            max,
            count: Mutex::new(0),
        }
    }

    fn count(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(limiter: &Arc<Self>) -> Option<ConnectionPermit> {
        let mut count = limiter.count();
        if let Some(max) = limiter.max {
            if *count >= max {
                return None;
            }
        }
        *count += 1;
        Some(ConnectionPermit {
            limiter: Arc::clone(limiter),
        })
    }

    fn live(&self) -> usize {
        *self.count()
    }
}

#[derive(Debug)]
struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let mut count = self.limiter.count();
        *count = count.saturating_sub(1);
    }
}

/// Runs the daemon until a shutdown signal arrives.
///
/// Prepares the sandbox root (and the anonymous home under it), loads
/// the user database, binds the control listener, and then accepts
/// connections, spawning one session thread each, until SIGINT or
/// SIGTERM raises the shutdown flag. In-flight sessions are drained
/// before returning.
pub fn run_daemon(config: DaemonConfig) -> Result<(), DaemonError> {
    signals::reset();
    signals::install();

    std::fs::create_dir_all(&config.root).map_err(|source| DaemonError::RootUnavailable {
        root: config.root.clone(),
        source,
    })?;
    let root = config
        .root
        .canonicalize()
        .map_err(|source| DaemonError::RootUnavailable {
            root: config.root.clone(),
            source,
        })?;

    if config.anonymous_enabled {
        let anon_physical = root.join(config.anonymous_home.trim_start_matches('/'));
        std::fs::create_dir_all(&anon_physical).map_err(|source| {
            DaemonError::RootUnavailable {
                root: anon_physical,
                source,
            }
        })?;
    }

    let store = Arc::new(UserStore::new(
        config.anonymous_enabled,
        config.anonymous_home.clone(),
    ));
    match store.load(&config.users_file) {
        Ok(count) => info!(count, file = %config.users_file.display(), "user database loaded"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(file = %config.users_file.display(), "no user database; anonymous only");
        }
        Err(source) => {
            return Err(DaemonError::UserDbUnreadable {
                path: config.users_file.clone(),
                source,
            });
        }
    }

    let listener = Listener::bind(config.family.as_family(), config.port, BACKLOG).map_err(
        |source| DaemonError::BindFailed {
            port: config.port,
            source,
        },
    )?;
    info!(port = config.port, root = %root.display(), "listening");

    let config = Arc::new(DaemonConfig {
        root,
        ..config
    });
    let locks = LockTable::new();
    let registry = Arc::new(CommandRegistry::standard());
    let limiter = Arc::new(ConnectionLimiter::new(config.max_connections));

    let mut next_id: u64 = 0;
    let mut sessions: Vec<thread::JoinHandle<()>> = Vec::new();

    while !signals::shutdown_requested() {
        let conn = match listener.accept_deadline(ACCEPT_TICK) {
            Ok(conn) => conn,
            Err(TransportError::Timeout) => {
                sessions.retain(|handle| !handle.is_finished());
                continue;
            }
            Err(error) => {
                warn!(%error, "accept failed");
                continue;
            }
        };

        let _ = conn.set_tcp_nodelay(true);
        let _ = conn.set_keepalive(true);
        let _ = conn.set_send_timeout(Some(config.idle_timeout));

        let peer = conn
            .peer_addr()
            .map(|(ip, port)| format!("{ip}:{port}"))
            .unwrap_or_else(|_| String::from("unknown"));

        let Some(permit) = ConnectionLimiter::try_acquire(&limiter) else {
            warn!(%peer, "connection cap reached");
            let mut conn = conn;
            let _ = conn.send_all(
                format_reply(
                    ReplyCode::ServiceNotAvailable,
                    "Service not available, too many connections",
                )
                .as_bytes(),
            );
            continue;
        };

        next_id += 1;
        let id = next_id;
        info!(%peer, session = id, "connection accepted");

        let store = Arc::clone(&store);
        let locks = locks.clone();
        let registry = Arc::clone(&registry);
        let config = Arc::clone(&config);
        sessions.push(thread::spawn(move || {
            run_session(conn, peer, id, &registry, store, locks, config);
            drop(permit);
        }));
    }

    info!(live = limiter.live(), "shutting down; draining sessions");
    drop(listener);
    for handle in sessions {
        let _ = handle.join();
    }
    Ok(())
}

/// One control connection from greeting to teardown.
fn run_session(
    conn: transport::Connection,
    peer: String,
    id: u64,
    registry: &CommandRegistry,
    store: Arc<UserStore>,
    locks: LockTable,
    config: Arc<DaemonConfig>,
) {
    let idle_timeout = config.idle_timeout;
    let Ok(mut session) = Session::new(conn, peer.clone(), id, store, locks, config.root.clone())
    else {
        warn!(%peer, "failed to set up session");
        return;
    };

    if session
        .reply(ReplyCode::ServiceReady, "FTP Server Ready")
        .is_err()
    {
        return;
    }

    loop {
        let line = match session.read_command(idle_timeout) {
            Ok(line) => line,
            Err(TransportError::Timeout) => {
                // Idle sessions are dropped without a parting reply.
                debug!(session = id, "idle timeout");
                break;
            }
            Err(TransportError::PeerClosed) => break,
            Err(TransportError::Overflow { .. }) => {
                let _ = session.reply(ReplyCode::SyntaxError, "Command line too long");
                break;
            }
            Err(error) => {
                debug!(session = id, %error, "control read failed");
                break;
            }
        };

        let text = String::from_utf8_lossy(&line);
        let command = match parse_command(&text) {
            Ok(command) => command,
            Err(_) => {
                if session
                    .reply(ReplyCode::SyntaxError, "Syntax error, command unrecognized")
                    .is_err()
                {
                    break;
                }
                continue;
            }
        };

        session.shared.stats.record_command();
        debug!(session = id, verb = %command.verb, "command");

        match registry.dispatch(&mut session, &command) {
            Ok(CommandOutcome::Continue) => {}
            Ok(CommandOutcome::Close) => break,
            Err(error) => {
                debug!(session = id, %error, "control write failed");
                break;
            }
        }
    }

    session.finish();
    info!(session = id, "session closed");
}
