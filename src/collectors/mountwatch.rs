//! Stuck-mount watchdog for the filesystem collector.
//!
//! `statfs(2)` on a dead network mount can block forever and cannot be
//! interrupted. Every call therefore runs on its own thread while the
//! collector waits for the result with a deadline. A mount whose call misses
//! the deadline is put into the [`QuarantineSet`] and is not touched again;
//! the blocked thread is disowned and lives until the kernel lets it go.
//!
//! Quarantine is only lifted by a call that completes in time, and quarantined
//! mounts are never called. Once a mount is quarantined it stays excluded for
//! the lifetime of the collector.

use std::ffi::CString;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use ahash::AHashSet as HashSet;
use tracing::debug;

pub const DEFAULT_MOUNT_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw `statfs` block and inode counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub block_size: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
}

/// Source of filesystem statistics for a path.
pub trait StatFsProvider: Send + Sync + 'static {
    fn statfs(&self, path: &Path) -> io::Result<StatFs>;
}

/// `statfs(2)` via libc.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcStatFs;

impl StatFsProvider for LibcStatFs {
    fn statfs(&self, path: &Path) -> io::Result<StatFs> {
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: libc::statfs is a plain C struct, valid when zeroed, and
        // c_path is a NUL-terminated string that outlives the call.
        unsafe {
            let mut stat: libc::statfs = mem::zeroed();
            if libc::statfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(io::Error::last_os_error());
            }

            Ok(StatFs {
                blocks: stat.f_blocks as u64,
                block_size: stat.f_bsize as u64,
                blocks_free: stat.f_bfree as u64,
                blocks_available: stat.f_bavail as u64,
                files: stat.f_files as u64,
                files_free: stat.f_ffree as u64,
            })
        }
    }
}

/// Mountpoints whose `statfs` call timed out.
///
/// All membership checks and changes go through the one lock.
#[derive(Debug, Default)]
pub struct QuarantineSet {
    stuck: Mutex<HashSet<String>>,
}

impl QuarantineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, mount_point: &str) -> bool {
        self.lock().contains(mount_point)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy of the quarantined mountpoints.
    pub fn mount_points(&self) -> Vec<String> {
        let mut mount_points: Vec<String> = self.lock().iter().cloned().collect();
        mount_points.sort();
        mount_points
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.stuck
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Result of one watched `statfs` attempt.
#[derive(Debug)]
pub enum StatOutcome {
    /// The call returned before the deadline (successfully or not).
    Completed(io::Result<StatFs>),
    /// Skipped: the mount was quarantined by an earlier attempt.
    Quarantined,
    /// The call missed the deadline; the mount is now quarantined.
    TimedOut,
}

pub struct MountWatchdog {
    statfs: Arc<dyn StatFsProvider>,
    quarantine: QuarantineSet,
    timeout: Duration,
}

impl MountWatchdog {
    pub fn new(statfs: Arc<dyn StatFsProvider>, timeout: Duration) -> Self {
        Self {
            statfs,
            quarantine: QuarantineSet::new(),
            timeout,
        }
    }

    pub fn quarantine(&self) -> &QuarantineSet {
        &self.quarantine
    }

    /// Stats `path` on behalf of `mount_point`, racing the call against the timeout.
    pub fn stat(&self, mount_point: &str, path: PathBuf) -> StatOutcome {
        if self.quarantine.contains(mount_point) {
            debug!(
                mountpoint = mount_point,
                "Mount point is in an unresponsive state"
            );
            return StatOutcome::Quarantined;
        }

        // Capacity 1 so the worker never blocks on send, even once disowned.
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        let statfs = Arc::clone(&self.statfs);
        let spawned = thread::Builder::new()
            .name("statfs".to_string())
            .spawn(move || {
                let result = statfs.statfs(&path);
                // The receiver is gone if the watchdog already gave up on this call.
                let _ = done_tx.send(result);
            });
        if let Err(e) = spawned {
            return StatOutcome::Completed(Err(e));
        }

        match done_rx.recv_timeout(self.timeout) {
            Ok(result) => {
                self.mark_recovered(&mut self.quarantine.lock(), mount_point);
                StatOutcome::Completed(result)
            }
            Err(RecvTimeoutError::Timeout) => {
                let mut stuck = self.quarantine.lock();
                // The call may have finished between the deadline and taking the lock.
                match done_rx.try_recv() {
                    Ok(result) => {
                        self.mark_recovered(&mut stuck, mount_point);
                        StatOutcome::Completed(result)
                    }
                    Err(_) => {
                        debug!(
                            mountpoint = mount_point,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Mount point timed out, it is being labeled as stuck and will not be monitored"
                        );
                        stuck.insert(mount_point.to_string());
                        StatOutcome::TimedOut
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => StatOutcome::Completed(Err(io::Error::new(
                io::ErrorKind::Other,
                "statfs worker exited without a result",
            ))),
        }
    }

    fn mark_recovered(&self, stuck: &mut HashSet<String>, mount_point: &str) {
        if stuck.remove(mount_point) {
            debug!(
                mountpoint = mount_point,
                "Mount point has recovered, monitoring will resume"
            );
        }
    }
}
