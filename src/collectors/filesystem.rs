//! Filesystem statistics collector.
//!
//! This module reads the mount table, stats every relevant mount through the
//! [`MountWatchdog`] and exposes the usage of the root filesystem.

use std::fs;
use std::io;
use std::sync::Arc;

use ahash::AHashSet as HashSet;
use regex::Regex;
use tracing::debug;

use super::mountwatch::{LibcStatFs, MountWatchdog, StatFs, StatFsProvider, StatOutcome};
use super::{Collector, CollectorContext, CollectorError};
use crate::paths::ProcPaths;
use crate::sample::{build_fq_name, Sample, SampleSink, NAMESPACE};

pub const DEF_IGNORED_MOUNT_POINTS: &str = "^/(dev|proc|sys|var/lib/docker/.+)($|/)";
pub const DEF_IGNORED_FS_TYPES: &str = "^(autofs|binfmt_misc|bpf|cgroup2?|configfs|debugfs|devpts|devtmpfs|fusectl|hugetlbfs|iso9660|mqueue|nsfs|overlay|proc|procfs|pstore|rpc_pipefs|securityfs|selinuxfs|squashfs|sysfs|tracefs)$";

const FILESYSTEM_SUBSYSTEM: &str = "disk";
const FILESYSTEM_USAGE_HELP: &str = "Filesystem usage percentage.";

/// One line of the mount table. The whole tuple identifies a mount within a scrape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountRecord {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: String,
}

/// Usage figures for a mount, in bytes and inodes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MountStat {
    pub size: f64,
    pub free: f64,
    pub avail: f64,
    pub files: f64,
    pub files_free: f64,
    pub read_only: bool,
    /// Set when the mount is quarantined or its `statfs` call failed.
    pub device_error: bool,
}

impl MountStat {
    fn unavailable() -> Self {
        Self {
            device_error: true,
            ..Self::default()
        }
    }

    fn from_statfs(stat: &StatFs, read_only: bool) -> Self {
        let block_size = stat.block_size as f64;
        Self {
            size: stat.blocks as f64 * block_size,
            free: stat.blocks_free as f64 * block_size,
            avail: stat.blocks_available as f64 * block_size,
            files: stat.files as f64,
            files_free: stat.files_free as f64,
            read_only,
            device_error: false,
        }
    }

    /// Percentage of the filesystem not available to unprivileged users.
    pub fn usage(&self) -> f64 {
        100.0 - self.avail / self.size * 100.0
    }
}

#[derive(Debug, Clone)]
pub struct FilesystemStats {
    pub mount: MountRecord,
    pub stat: MountStat,
}

/// Parses a mount table (`/proc/mounts` format).
///
/// Octal escapes for space (`\040`) and tab (`\011`) in the mountpoint are
/// decoded as per fstab(5).
pub fn parse_mounts(content: &str, paths: &ProcPaths) -> Result<Vec<MountRecord>, CollectorError> {
    let mut filesystems = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if parts.len() < 4 {
            return Err(CollectorError::parse(
                "mount point information",
                format!("{:?}", line),
            ));
        }

        let mount_point = parts[1].replace("\\040", " ").replace("\\011", "\t");

        filesystems.push(MountRecord {
            device: parts[0].to_string(),
            mount_point: paths.rootfs_strip_prefix(&mount_point),
            fs_type: parts[2].to_string(),
            options: parts[3].to_string(),
        });
    }

    Ok(filesystems)
}

fn is_read_only(options: &str) -> bool {
    options.split(',').any(|option| option == "ro")
}

pub struct FilesystemCollector {
    paths: ProcPaths,
    ignored_mount_points: Regex,
    ignored_fs_types: Regex,
    watchdog: MountWatchdog,
    usage_name: String,
}

impl FilesystemCollector {
    pub fn new(ctx: &CollectorContext) -> Result<Self, CollectorError> {
        Self::with_statfs(ctx, Arc::new(LibcStatFs))
    }

    /// Builds the collector around a custom `statfs` source.
    pub fn with_statfs(
        ctx: &CollectorContext,
        statfs: Arc<dyn StatFsProvider>,
    ) -> Result<Self, CollectorError> {
        let ignored_mount_points = Regex::new(&ctx.ignored_mount_points)
            .map_err(|e| CollectorError::Config(format!("ignored mount points pattern: {}", e)))?;
        let ignored_fs_types = Regex::new(&ctx.ignored_fs_types)
            .map_err(|e| CollectorError::Config(format!("ignored fs types pattern: {}", e)))?;

        Ok(Self {
            paths: ctx.paths.clone(),
            ignored_mount_points,
            ignored_fs_types,
            watchdog: MountWatchdog::new(statfs, ctx.mount_timeout),
            usage_name: build_fq_name(NAMESPACE, FILESYSTEM_SUBSYSTEM, "usage"),
        })
    }

    pub fn watchdog(&self) -> &MountWatchdog {
        &self.watchdog
    }

    /// Reads the init process' mount table, falling back to the caller's own
    /// when `/proc/1` is hidden (hidepid).
    fn mount_point_details(&self) -> Result<Vec<MountRecord>, CollectorError> {
        let root_mounts = self.paths.proc_file("1/mounts");
        let content = match fs::read_to_string(&root_mounts) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(
                    "Reading root mounts failed, falling back to system mounts: {}",
                    e
                );
                let mounts = self.paths.proc_file("mounts");
                fs::read_to_string(&mounts).map_err(|e| CollectorError::io(&mounts, e))?
            }
            Err(e) => return Err(CollectorError::io(&root_mounts, e)),
        };

        parse_mounts(&content, &self.paths)
    }

    /// Stats every mount that is not ignored, once per distinct mount record.
    pub fn get_stats(&self) -> Result<Vec<FilesystemStats>, CollectorError> {
        let mounts = self.mount_point_details()?;

        let mut seen = HashSet::new();
        let mut stats = Vec::new();
        for mount in mounts {
            if self.ignored_mount_points.is_match(&mount.mount_point) {
                debug!(mountpoint = %mount.mount_point, "Ignoring mount point");
                continue;
            }
            if self.ignored_fs_types.is_match(&mount.fs_type) {
                debug!(fstype = %mount.fs_type, "Ignoring fs type");
                continue;
            }
            if !seen.insert(mount.clone()) {
                continue;
            }

            let path = self.paths.rootfs_file(&mount.mount_point);
            let stat = match self.watchdog.stat(&mount.mount_point, path.clone()) {
                StatOutcome::Completed(Ok(stat)) => {
                    MountStat::from_statfs(&stat, is_read_only(&mount.options))
                }
                StatOutcome::Completed(Err(e)) => {
                    debug!(
                        rootfs = %path.display(),
                        "Error on statfs() system call: {}",
                        e
                    );
                    MountStat::unavailable()
                }
                StatOutcome::Quarantined | StatOutcome::TimedOut => MountStat::unavailable(),
            };

            stats.push(FilesystemStats { mount, stat });
        }

        Ok(stats)
    }
}

impl Collector for FilesystemCollector {
    fn update(&self, sink: &SampleSink) -> Result<(), CollectorError> {
        let mut emitted = HashSet::new();
        for fs_stats in self.get_stats()? {
            let FilesystemStats { mount, stat } = fs_stats;
            if stat.device_error {
                continue;
            }
            // Only the root filesystem backed by a real block device is exported.
            if mount.mount_point != "/" || !mount.device.starts_with('/') {
                continue;
            }
            // At most one sample per mountpoint, even when options differ.
            if !emitted.insert(mount.mount_point.clone()) {
                debug!(mountpoint = %mount.mount_point, "Mount point already reported");
                continue;
            }

            sink.emit(
                Sample::gauge(self.usage_name.as_str(), FILESYSTEM_USAGE_HELP, stat.usage())
                    .with_label("device", mount.device)
                    .with_label("mountpoint", mount.mount_point)
                    .with_label("fstype", mount.fs_type),
            );
        }

        Ok(())
    }
}

pub fn new_collector(ctx: &CollectorContext) -> Result<Box<dyn Collector>, CollectorError> {
    Ok(Box::new(FilesystemCollector::new(ctx)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mounts_unescapes_mount_point() {
        let content = "/dev/sda1 / ext4 rw,relatime 0 0
/dev/sdb1 /mnt/my\\040disk ext4 ro,relatime 0 0
/dev/sdc1 /mnt/tab\\011here xfs rw 0 0
";
        let mounts = parse_mounts(content, &ProcPaths::default()).unwrap();
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[0].device, "/dev/sda1");
        assert_eq!(mounts[0].mount_point, "/");
        assert_eq!(mounts[0].fs_type, "ext4");
        assert_eq!(mounts[0].options, "rw,relatime");
        assert_eq!(mounts[1].mount_point, "/mnt/my disk");
        assert_eq!(mounts[2].mount_point, "/mnt/tab\there");
    }

    #[test]
    fn test_parse_mounts_rejects_short_line() {
        let result = parse_mounts("/dev/sda1 / ext4\n", &ProcPaths::default());
        assert!(matches!(result, Err(CollectorError::Parse { .. })));
    }

    #[test]
    fn test_read_only_option() {
        assert!(is_read_only("ro,relatime"));
        assert!(!is_read_only("rw,errors=remount-ro"));
    }

    #[test]
    fn test_usage_from_statfs() {
        let stat = MountStat::from_statfs(
            &StatFs {
                blocks: 1000,
                block_size: 4096,
                blocks_free: 300,
                blocks_available: 200,
                files: 50,
                files_free: 10,
            },
            false,
        );
        assert_eq!(stat.size, 4_096_000.0);
        assert_eq!(stat.free, 1_228_800.0);
        assert!((stat.usage() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_patterns() {
        let mount_points = Regex::new(DEF_IGNORED_MOUNT_POINTS).unwrap();
        assert!(mount_points.is_match("/proc"));
        assert!(mount_points.is_match("/sys/fs/cgroup"));
        assert!(mount_points.is_match("/var/lib/docker/overlay2"));
        assert!(!mount_points.is_match("/"));
        assert!(!mount_points.is_match("/home"));

        let fs_types = Regex::new(DEF_IGNORED_FS_TYPES).unwrap();
        assert!(fs_types.is_match("cgroup2"));
        assert!(fs_types.is_match("tracefs"));
        assert!(!fs_types.is_match("ext4"));
        assert!(!fs_types.is_match("tmpfs"));
    }
}
