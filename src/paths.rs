//! Locations of the kernel-exposed files read by the collectors.
//!
//! Defaults to the host's `/proc` and `/`. Both roots can be moved, which is
//! how the agent runs inside a container with the host filesystem mounted
//! elsewhere, and how tests point collectors at fixture trees.

use std::path::PathBuf;

pub const DEFAULT_PROCFS: &str = "/proc";
pub const DEFAULT_ROOTFS: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcPaths {
    procfs: PathBuf,
    rootfs: PathBuf,
}

impl Default for ProcPaths {
    fn default() -> Self {
        Self::new(DEFAULT_PROCFS, DEFAULT_ROOTFS)
    }
}

impl ProcPaths {
    pub fn new(procfs: impl Into<PathBuf>, rootfs: impl Into<PathBuf>) -> Self {
        Self {
            procfs: procfs.into(),
            rootfs: rootfs.into(),
        }
    }

    /// `<procfs>/<name>`, e.g. `proc_file("net/dev")`.
    pub fn proc_file(&self, name: &str) -> PathBuf {
        self.procfs.join(name)
    }

    /// Resolves an absolute host path under the configured root filesystem.
    pub fn rootfs_file(&self, path: &str) -> PathBuf {
        self.rootfs.join(path.trim_start_matches('/'))
    }

    /// Turns a mountpoint as seen from inside `rootfs` back into a host path.
    pub fn rootfs_strip_prefix(&self, path: &str) -> String {
        let root = self.rootfs.to_string_lossy();
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            return path.to_string();
        }
        match path.strip_prefix(root) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => path.to_string(),
        }
    }
}
