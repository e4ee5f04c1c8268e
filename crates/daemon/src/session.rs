//! Per-connection session state and control-channel I/O.
//!
//! The session thread owns the read side of the control connection;
//! the write side sits behind a mutex in [`SessionShared`] so the
//! session thread and its transfer worker serialize replies, keeping
//! multi-line replies atomic from the peer's point of view. The
//! shared core also carries the abort flag, the transfer status, a
//! shutdown handle for the active data socket, and the statistics
//! counters: everything ABOR and the worker need to touch from
//! another thread.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use protocol::{FileStructure, Reply, ReplyCode, TransferMode, TransferType};
use tracing::debug;
use transport::{connect_timeout, Connection, Listener, TransportError};
use vfs::locks::LockTable;
use vfs::{fs as vfsfs, path as vfspath, Resolved, VfsError};

use crate::registry::CommandOutcome;
use crate::stats::SessionStats;
use crate::transfer::{self, TransferTask};
use crate::users::{Permissions, User, UserStore};

/// Passive-mode data ports are drawn from this range.
pub(crate) const PASSIVE_PORT_RANGE: std::ops::RangeInclusive<u16> = 20000..=65535;

/// Deadline for establishing a data connection at 150 time.
pub(crate) const DATA_CHANNEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest accepted control line, terminator included.
const MAX_COMMAND_LINE: usize = 1024;

/// Authentication progress of the control connection.
///
/// Transitions are strictly forward; REIN starts a fresh cycle by
/// returning to `Connected`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// Greeted, no USER yet.
    Connected,
    /// USER accepted, PASS outstanding.
    AwaitingPassword,
    /// Credentials verified.
    Authenticated,
    /// QUIT processed; the connection is being torn down.
    Closing,
}

/// Negotiated data-channel mode.
#[derive(Debug, Default)]
pub(crate) enum DataMode {
    /// Nothing negotiated.
    #[default]
    None,
    /// PORT: connect out to the peer at transfer time.
    Active {
        /// Peer endpoint to connect to.
        addr: SocketAddr,
    },
    /// PASV: a bound listener awaiting the peer's connect.
    Passive {
        /// The pre-bound listener.
        listener: Listener,
    },
}

/// Lifecycle of the (at most one) transfer per session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TransferState {
    Idle,
    Starting,
    Running,
    Completing,
    Aborted,
}

/// Why a data channel could not be opened.
#[derive(Debug)]
pub(crate) enum DataChannelError {
    /// Neither PORT nor PASV was negotiated.
    NoMode,
    /// Connect/accept failed or timed out.
    Failed,
}

/// A transfer was already in flight when another was requested.
#[derive(Debug)]
pub(crate) struct TransferBusy;

/// State shared between the session thread and its transfer worker.
#[derive(Debug)]
pub(crate) struct SessionShared {
    /// Monotonic id for log correlation.
    pub(crate) id: u64,
    /// Peer address, printable.
    pub(crate) peer: String,
    writer: Mutex<Connection>,
    /// Transfer counters; survive REIN.
    pub(crate) stats: SessionStats,
    abort_requested: AtomicBool,
    transfer_state: Mutex<TransferState>,
    transfer_idle: Condvar,
    data_shutdown: Mutex<Option<Connection>>,
}

impl SessionShared {
    fn transfer_state_guard(&self) -> MutexGuard<'_, TransferState> {
        self.transfer_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Serializes a reply onto the control stream.
    pub(crate) fn send_reply(&self, reply: &Reply) -> io::Result<()> {
        self.send_raw(&reply.to_wire())
    }

    /// Serializes pre-formatted reply text onto the control stream.
    pub(crate) fn send_raw(&self, text: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.send_all(text.as_bytes())
    }

    pub(crate) fn transfer_state(&self) -> TransferState {
        *self.transfer_state_guard()
    }

    pub(crate) fn set_transfer_state(&self, state: TransferState) {
        *self.transfer_state_guard() = state;
        self.transfer_idle.notify_all();
    }

    /// Blocks until the worker parks the transfer back at `Idle`.
    pub(crate) fn wait_transfer_idle(&self) {
        let mut state = self.transfer_state_guard();
        while *state != TransferState::Idle {
            state = self
                .transfer_idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_abort(&self) {
        self.abort_requested.store(false, Ordering::SeqCst);
    }

    /// Flags the running transfer as aborted and slams its data
    /// socket shut so blocking worker I/O fails promptly.
    pub(crate) fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::SeqCst);
        if let Some(handle) = self.take_data_shutdown() {
            let _ = handle.shutdown_both();
        }
    }

    pub(crate) fn store_data_shutdown(&self, handle: Connection) {
        *self
            .data_shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub(crate) fn take_data_shutdown(&self) -> Option<Connection> {
        self.data_shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// One control connection's worth of server state.
#[derive(Debug)]
pub struct Session {
    control: Connection,
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) state: SessionState,
    pub(crate) user: Option<User>,
    pending_user: Option<String>,
    root: PathBuf,
    pub(crate) cwd: String,
    pub(crate) transfer_type: TransferType,
    pub(crate) transfer_mode: TransferMode,
    pub(crate) structure: FileStructure,
    data_mode: DataMode,
    pub(crate) rest_offset: u64,
    pub(crate) rename_from: Option<Resolved>,
    worker: Option<JoinHandle<()>>,
    pub(crate) store: Arc<UserStore>,
    pub(crate) locks: LockTable,
    pub(crate) connect_time: Instant,
    pub(crate) last_activity: Instant,
}

impl Session {
    /// Wraps an accepted control connection.
    pub(crate) fn new(
        control: Connection,
        peer: String,
        id: u64,
        store: Arc<UserStore>,
        locks: LockTable,
        root: PathBuf,
    ) -> io::Result<Self> {
        let writer = control.try_clone()?;
        let shared = Arc::new(SessionShared {
            id,
            peer,
            writer: Mutex::new(writer),
            stats: SessionStats::default(),
            abort_requested: AtomicBool::new(false),
            transfer_state: Mutex::new(TransferState::Idle),
            transfer_idle: Condvar::new(),
            data_shutdown: Mutex::new(None),
        });
        Ok(Self {
            control,
            shared,
            state: SessionState::Connected,
            user: None,
            pending_user: None,
            root,
            cwd: String::from("/"),
            transfer_type: TransferType::default(),
            transfer_mode: TransferMode::default(),
            structure: FileStructure::default(),
            data_mode: DataMode::None,
            rest_offset: 0,
            rename_from: None,
            worker: None,
            store,
            locks,
            connect_time: Instant::now(),
            last_activity: Instant::now(),
        })
    }

    /// Reads the next raw command line from the peer.
    pub(crate) fn read_command(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let line = self.control.recv_line(MAX_COMMAND_LINE, timeout)?;
        self.last_activity = Instant::now();
        Ok(line)
    }

    /// Sends a single-line reply.
    pub(crate) fn reply(&self, code: ReplyCode, text: &str) -> io::Result<()> {
        self.shared.send_reply(&Reply::new(code, text))
    }

    /// Sends a multi-line reply atomically.
    pub(crate) fn reply_lines(&self, code: ReplyCode, lines: Vec<String>) -> io::Result<()> {
        self.shared.send_reply(&Reply::multi_line(code, lines))
    }

    /// Sends pre-formatted reply text (FEAT's bare feature lines).
    pub(crate) fn reply_raw(&self, text: &str) -> io::Result<()> {
        self.shared.send_raw(text)
    }

    /// Replies and keeps the session going; the common handler tail.
    pub(crate) fn answer(&self, code: ReplyCode, text: &str) -> io::Result<CommandOutcome> {
        self.reply(code, text)?;
        Ok(CommandOutcome::Continue)
    }

    /// Records a USER candidate and moves to `AwaitingPassword`.
    pub(crate) fn set_user(&mut self, name: &str) {
        self.pending_user = Some(name.to_string());
        self.user = None;
        self.state = SessionState::AwaitingPassword;
    }

    /// Verifies PASS against the credential store.
    ///
    /// On success the account's permissions and home are loaded and,
    /// when the home exists on disk, the working directory starts
    /// there. On failure the state machine returns to `Connected`.
    pub(crate) fn authenticate(&mut self, password: &str) -> bool {
        let Some(name) = self.pending_user.take() else {
            return false;
        };
        if !self.store.verify(&name, password) {
            self.state = SessionState::Connected;
            return false;
        }
        let Some(user) = self.store.lookup(&name) else {
            self.state = SessionState::Connected;
            return false;
        };

        self.cwd = String::from("/");
        if let Ok(resolved) = vfspath::resolve_virtual(&self.root, "/", &user.home) {
            if vfsfs::is_dir(&resolved.physical) {
                self.cwd = resolved.virtual_path;
            }
        }
        debug!(session = self.shared.id, user = %user.name, "login ok");
        self.user = Some(user);
        self.state = SessionState::Authenticated;
        true
    }

    /// Resolves a client-supplied path against the sandbox.
    pub(crate) fn resolve(&self, input: &str) -> Result<Resolved, VfsError> {
        vfspath::resolve_virtual(&self.root, &self.cwd, input)
    }

    /// Resolves a server-generated path, skipping the raw-input
    /// screening (CDUP's synthetic "..").
    pub(crate) fn resolve_trusted(&self, input: &str) -> Resolved {
        let virtual_path = vfspath::normalize_virtual(&self.cwd, input);
        let relative = virtual_path.trim_start_matches('/');
        let physical = if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        };
        Resolved {
            virtual_path,
            physical,
        }
    }

    /// Sandbox and permission check for one virtual path.
    ///
    /// ADMIN bypasses both; everyone else needs the permission bits
    /// and a path inside their home subtree.
    pub(crate) fn check_access(&self, virtual_path: &str, required: Permissions) -> bool {
        match &self.user {
            None => false,
            Some(user) if user.permissions.is_admin() => true,
            Some(user) => {
                user.permissions.contains(required)
                    && vfspath::virtual_is_within(virtual_path, &user.home)
            }
        }
    }

    /// Switches the working directory after access checks succeed.
    pub(crate) fn change_directory(&mut self, resolved: &Resolved) -> bool {
        if !vfsfs::is_dir(&resolved.physical) {
            return false;
        }
        self.cwd = resolved.virtual_path.clone();
        true
    }

    /// Human-readable name of the negotiated data mode (STAT).
    pub(crate) fn data_mode_name(&self) -> &'static str {
        match self.data_mode {
            DataMode::None => "none",
            DataMode::Active { .. } => "active (PORT)",
            DataMode::Passive { .. } => "passive (PASV)",
        }
    }

    /// Records active (PORT) mode, discarding any previous data state.
    pub(crate) fn set_active(&mut self, addr: Ipv4Addr, port: u16) {
        self.close_data_channel();
        self.data_mode = DataMode::Active {
            addr: SocketAddr::new(IpAddr::V4(addr), port),
        };
    }

    /// Binds a passive listener and returns the endpoint to
    /// advertise: the control connection's local IPv4 address and the
    /// assigned port.
    pub(crate) fn set_passive(&mut self) -> Result<(Ipv4Addr, u16), DataChannelError> {
        self.close_data_channel();

        let advertise = self.advertised_ipv4().ok_or(DataChannelError::Failed)?;
        let (listener, port) = Listener::bind_in_range(
            transport::AddrFamily::Unspec,
            PASSIVE_PORT_RANGE,
            16,
        )
        .map_err(|_| DataChannelError::Failed)?;
        self.data_mode = DataMode::Passive { listener };
        Ok((advertise, port))
    }

    fn advertised_ipv4(&self) -> Option<Ipv4Addr> {
        let (ip, _port) = self.control.local_addr().ok()?;
        match ip.parse::<IpAddr>().ok()? {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        }
    }

    /// Establishes the data connection for a transfer.
    ///
    /// Active mode connects out to the stored peer; passive mode
    /// accepts on the pre-bound listener, which is closed once the
    /// peer arrives. A shutdown handle is parked in the shared core
    /// so ABOR can break the worker's blocking I/O.
    pub(crate) fn open_data_channel(
        &mut self,
        timeout: Duration,
    ) -> Result<Connection, DataChannelError> {
        let conn = match &self.data_mode {
            DataMode::None => return Err(DataChannelError::NoMode),
            DataMode::Active { addr } => {
                connect_timeout(*addr, timeout).map_err(|_| DataChannelError::Failed)?
            }
            DataMode::Passive { listener } => listener
                .accept_deadline(timeout)
                .map_err(|_| DataChannelError::Failed)?,
        };
        if matches!(self.data_mode, DataMode::Passive { .. }) {
            self.data_mode = DataMode::None;
        }
        if let Ok(handle) = conn.try_clone() {
            self.shared.store_data_shutdown(handle);
        }
        Ok(conn)
    }

    /// Drops any negotiated data state and closes a live data socket.
    pub(crate) fn close_data_channel(&mut self) {
        self.data_mode = DataMode::None;
        if let Some(handle) = self.shared.take_data_shutdown() {
            let _ = handle.shutdown_both();
        }
    }

    /// Hands a transfer to a fresh worker thread.
    ///
    /// Fails when a transfer is already in flight; the session runs at
    /// most one.
    pub(crate) fn start_transfer(&mut self, task: TransferTask) -> Result<(), TransferBusy> {
        if self.shared.transfer_state() != TransferState::Idle {
            return Err(TransferBusy);
        }
        self.reap_worker();
        self.shared.clear_abort();
        self.shared.set_transfer_state(TransferState::Starting);
        let shared = Arc::clone(&self.shared);
        self.worker = Some(std::thread::spawn(move || transfer::run(&shared, task)));
        Ok(())
    }

    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    /// Waits for the in-flight transfer (if any) to finish.
    pub(crate) fn join_transfer(&mut self) {
        if self.worker.is_some() {
            self.shared.wait_transfer_idle();
            self.reap_worker();
        }
    }

    /// ABOR/REIN path: abort the worker and wait it out.
    pub(crate) fn abort_transfer_and_join(&mut self) {
        self.shared.request_abort();
        self.join_transfer();
    }

    /// Stores a restart offset (REST).
    pub(crate) fn set_rest(&mut self, offset: u64) {
        self.rest_offset = offset;
    }

    /// Consumes the restart offset.
    pub(crate) fn take_rest(&mut self) -> u64 {
        std::mem::take(&mut self.rest_offset)
    }

    /// Latches the rename source (RNFR).
    pub(crate) fn set_rename_from(&mut self, resolved: Resolved) {
        self.rename_from = Some(resolved);
    }

    /// Consumes the rename source for RNTO.
    pub(crate) fn take_rename_from(&mut self) -> Option<Resolved> {
        self.rename_from.take()
    }

    /// REIN: back to the freshly connected state.
    ///
    /// Cancels any running transfer, drops authentication, resets the
    /// working directory and transfer parameters, and clears REST and
    /// RNFR latches. Statistics survive.
    pub(crate) fn reinitialize(&mut self) {
        self.abort_transfer_and_join();
        self.close_data_channel();
        self.user = None;
        self.pending_user = None;
        self.state = SessionState::Connected;
        self.cwd = String::from("/");
        self.transfer_type = TransferType::default();
        self.transfer_mode = TransferMode::default();
        self.structure = FileStructure::default();
        self.rest_offset = 0;
        self.rename_from = None;
        self.shared.clear_abort();
    }

    /// Tears the session down at QUIT/exit time.
    pub(crate) fn finish(&mut self) {
        self.state = SessionState::Closing;
        self.join_transfer();
        self.close_data_channel();
        debug!(
            session = self.shared.id,
            idle_secs = self.last_activity.elapsed().as_secs(),
            lifetime_secs = self.connect_time.elapsed().as_secs(),
            "closing control connection"
        );
        let _ = self.control.shutdown_both();
    }
}
