//! Per-session transfer counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic per-session statistics, shared with the transfer worker.
///
/// Counters only ever increase; REIN deliberately leaves them alone.
#[derive(Debug, Default)]
pub struct SessionStats {
    bytes_uploaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    files_uploaded: AtomicU64,
    files_downloaded: AtomicU64,
    commands: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    /// Bytes received via STOR/APPE.
    pub bytes_uploaded: u64,
    /// Bytes sent via RETR.
    pub bytes_downloaded: u64,
    /// Completed uploads.
    pub files_uploaded: u64,
    /// Completed downloads.
    pub files_downloaded: u64,
    /// Commands processed.
    pub commands: u64,
}

impl SessionStats {
    /// Records one successful upload of `bytes`.
    pub fn record_upload(&self, bytes: u64) {
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
        self.files_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one successful download of `bytes`.
    pub fn record_download(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
        self.files_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one processed command.
    pub fn record_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            files_uploaded: self.files_uploaded.load(Ordering::Relaxed),
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
        }
    }
}
