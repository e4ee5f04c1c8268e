//! Process-wide cooperative reader/writer locks keyed by physical path.
//!
//! Sessions that touch the same file coordinate through one shared
//! [`LockTable`]; the locks are advisory between this server's own
//! threads and never involve the OS. The policy is writer-preferring:
//! once a writer is waiting on a path, new readers queue behind it.
//! Acquisition blocks; the non-blocking inspectors exist only so
//! handlers can produce a readable "busy" reply before committing to
//! the blocking acquire, which remains the sole correctness mechanism.
//!
//! Entries are garbage-collected as soon as the last interested party
//! releases, so an idle table is empty.

use std::collections::hash_map::Entry as MapEntry;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

#[derive(Debug)]
struct PathLock {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
    cond: Arc<Condvar>,
}

impl PathLock {
    fn new() -> Self {
        Self {
            readers: 0,
            writer: false,
            waiting_writers: 0,
            cond: Arc::new(Condvar::new()),
        }
    }

    const fn idle(&self) -> bool {
        self.readers == 0 && !self.writer && self.waiting_writers == 0
    }
}

#[derive(Debug, Default)]
struct TableState {
    entries: Mutex<FxHashMap<PathBuf, PathLock>>,
}

/// A cloneable handle to the process-wide table of per-path locks.
///
/// Create one at startup and hand clones to every session task; all
/// clones share the same underlying table.
#[derive(Clone, Debug, Default)]
pub struct LockTable {
    state: Arc<TableState>,
}

impl LockTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, FxHashMap<PathBuf, PathLock>> {
        self.state
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a shared (reader) lock on `path` is held.
    ///
    /// Readers wait while a writer holds the lock or any writer is
    /// waiting for it.
    pub fn acquire_shared(&self, path: &Path) -> SharedGuard {
        let mut entries = self.entries();
        loop {
            let lock = entries
                .entry(path.to_path_buf())
                .or_insert_with(PathLock::new);
            if !lock.writer && lock.waiting_writers == 0 {
                lock.readers += 1;
                return SharedGuard {
                    table: self.clone(),
                    path: path.to_path_buf(),
                };
            }
            let cond = Arc::clone(&lock.cond);
            entries = cond.wait(entries).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the exclusive (writer) lock on `path` is held.
    pub fn acquire_exclusive(&self, path: &Path) -> ExclusiveGuard {
        let mut entries = self.entries();
        entries
            .entry(path.to_path_buf())
            .or_insert_with(PathLock::new)
            .waiting_writers += 1;
        loop {
            // The entry cannot be collected while our waiting_writers
            // registration keeps it non-idle; re-register if it was.
            let lock = match entries.entry(path.to_path_buf()) {
                MapEntry::Occupied(occupied) => occupied.into_mut(),
                MapEntry::Vacant(vacant) => {
                    let lock = vacant.insert(PathLock::new());
                    lock.waiting_writers += 1;
                    lock
                }
            };
            if !lock.writer && lock.readers == 0 {
                lock.waiting_writers -= 1;
                lock.writer = true;
                return ExclusiveGuard {
                    table: self.clone(),
                    path: path.to_path_buf(),
                };
            }
            let cond = Arc::clone(&lock.cond);
            entries = cond.wait(entries).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether a writer currently holds `path`.
    ///
    /// Advisory only: the answer may be stale by the time the caller
    /// acts on it.
    #[must_use]
    pub fn is_exclusive_locked(&self, path: &Path) -> bool {
        self.entries().get(path).is_some_and(|lock| lock.writer)
    }

    /// Number of readers currently holding `path`. Advisory only.
    #[must_use]
    pub fn shared_count(&self, path: &Path) -> usize {
        self.entries().get(path).map_or(0, |lock| lock.readers)
    }

    fn release_shared(&self, path: &Path) {
        let mut entries = self.entries();
        if let Some(lock) = entries.get_mut(path) {
            lock.readers = lock.readers.saturating_sub(1);
            lock.cond.notify_all();
            if lock.idle() {
                entries.remove(path);
            }
        }
    }

    fn release_exclusive(&self, path: &Path) {
        let mut entries = self.entries();
        if let Some(lock) = entries.get_mut(path) {
            lock.writer = false;
            lock.cond.notify_all();
            if lock.idle() {
                entries.remove(path);
            }
        }
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries().len()
    }
}

/// RAII holder of a shared lock; released on drop.
#[derive(Debug)]
pub struct SharedGuard {
    table: LockTable,
    path: PathBuf,
}

impl Drop for SharedGuard {
    fn drop(&mut self) {
        self.table.release_shared(&self.path);
    }
}

/// RAII holder of an exclusive lock; released on drop.
#[derive(Debug)]
pub struct ExclusiveGuard {
    table: LockTable,
    path: PathBuf,
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        self.table.release_exclusive(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn multiple_readers_coexist() {
        let table = LockTable::new();
        let path = Path::new("/srv/a");
        let first = table.acquire_shared(path);
        let second = table.acquire_shared(path);
        assert_eq!(table.shared_count(path), 2);
        drop(first);
        drop(second);
        assert_eq!(table.entry_count(), 0);
    }

    #[test]
    fn writer_excludes_readers_and_writers() {
        let table = LockTable::new();
        let path = Path::new("/srv/b");
        let guard = table.acquire_exclusive(path);
        assert!(table.is_exclusive_locked(path));

        let (tx, rx) = mpsc::channel();
        let contender = {
            let table = table.clone();
            thread::spawn(move || {
                let _shared = table.acquire_shared(Path::new("/srv/b"));
                tx.send(()).expect("send");
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(2)).expect("reader ran");
        contender.join().expect("join");
        assert_eq!(table.entry_count(), 0);
    }

    #[test]
    fn waiting_writer_blocks_new_readers() {
        let table = LockTable::new();
        let path = Path::new("/srv/c");
        let initial_reader = table.acquire_shared(path);

        let (order_tx, order_rx) = mpsc::channel::<&'static str>();

        let writer = {
            let table = table.clone();
            let tx = order_tx.clone();
            thread::spawn(move || {
                let guard = table.acquire_exclusive(Path::new("/srv/c"));
                tx.send("writer").expect("send");
                thread::sleep(Duration::from_millis(50));
                drop(guard);
            })
        };

        // Give the writer time to register as waiting.
        thread::sleep(Duration::from_millis(100));

        let late_reader = {
            let table = table.clone();
            let tx = order_tx;
            thread::spawn(move || {
                let _guard = table.acquire_shared(Path::new("/srv/c"));
                tx.send("reader").expect("send");
            })
        };

        // The late reader must not slip in ahead of the waiting writer.
        assert!(order_rx.recv_timeout(Duration::from_millis(100)).is_err());

        drop(initial_reader);
        let first = order_rx.recv_timeout(Duration::from_secs(2)).expect("first");
        let second = order_rx.recv_timeout(Duration::from_secs(2)).expect("second");
        assert_eq!(first, "writer");
        assert_eq!(second, "reader");

        writer.join().expect("writer join");
        late_reader.join().expect("reader join");
        assert_eq!(table.entry_count(), 0);
    }

    #[test]
    fn locks_on_distinct_paths_are_independent() {
        let table = LockTable::new();
        let a = table.acquire_exclusive(Path::new("/srv/x"));
        let b = table.acquire_exclusive(Path::new("/srv/y"));
        assert!(table.is_exclusive_locked(Path::new("/srv/x")));
        assert!(table.is_exclusive_locked(Path::new("/srv/y")));
        drop(a);
        drop(b);
        assert_eq!(table.entry_count(), 0);
    }

    #[test]
    fn inspectors_are_quiet_on_unknown_paths() {
        let table = LockTable::new();
        assert!(!table.is_exclusive_locked(Path::new("/srv/none")));
        assert_eq!(table.shared_count(Path::new("/srv/none")), 0);
    }
}
