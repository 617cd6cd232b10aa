//! Collectors module for host metrics.
//!
//! Each collector samples one resource category (CPU, memory, filesystem,
//! network) from procfs and emits samples into a [`SampleSink`]. Collectors are
//! built through an explicit [`CollectorRegistry`] owned by the application
//! rather than a process-wide factory table.

pub mod cpu;
pub mod filesystem;
pub mod meminfo;
pub mod mountwatch;
pub mod netdev;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::paths::ProcPaths;
use crate::sample::SampleSink;

/// Names of the collectors enabled when the configuration does not list any.
pub const DEFAULT_COLLECTORS: [&str; 4] = ["cpu", "mem", "disk", "netio"];

/// Sampling contract shared by all collectors.
///
/// `update` may block (file reads, sleeps, system calls); the orchestrator
/// runs every collector on its own worker.
pub trait Collector: Send + Sync {
    fn update(&self, sink: &SampleSink) -> Result<(), CollectorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// The collector ran correctly but had nothing to report this cycle.
    #[error("collector returned no data")]
    NoData,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("invalid collector configuration: {0}")]
    Config(String),

    #[error("collector panicked: {0}")]
    Panicked(String),
}

impl CollectorError {
    pub fn is_no_data(&self) -> bool {
        matches!(self, CollectorError::NoData)
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CollectorError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(what: &'static str, reason: impl Into<String>) -> Self {
        CollectorError::Parse {
            what,
            reason: reason.into(),
        }
    }
}

/// Settings handed to collector factories.
#[derive(Debug, Clone)]
pub struct CollectorContext {
    pub paths: ProcPaths,
    /// Window between the two `/proc/stat` snapshots of the CPU collector.
    pub cpu_interval: Duration,
    /// How long a `statfs` call may take before its mount is quarantined.
    pub mount_timeout: Duration,
    pub ignored_mount_points: String,
    pub ignored_fs_types: String,
    pub netdev_device_exclude: Option<String>,
    pub netdev_device_include: Option<String>,
}

impl Default for CollectorContext {
    fn default() -> Self {
        Self {
            paths: ProcPaths::default(),
            cpu_interval: cpu::DEFAULT_INTERVAL,
            mount_timeout: mountwatch::DEFAULT_MOUNT_TIMEOUT,
            ignored_mount_points: filesystem::DEF_IGNORED_MOUNT_POINTS.to_string(),
            ignored_fs_types: filesystem::DEF_IGNORED_FS_TYPES.to_string(),
            netdev_device_exclude: None,
            netdev_device_include: None,
        }
    }
}

impl CollectorContext {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            paths: config.proc_paths(),
            cpu_interval: config
                .cpu_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.cpu_interval),
            mount_timeout: config
                .mount_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.mount_timeout),
            ignored_mount_points: config
                .ignored_mount_points
                .clone()
                .unwrap_or(defaults.ignored_mount_points),
            ignored_fs_types: config
                .ignored_fs_types
                .clone()
                .unwrap_or(defaults.ignored_fs_types),
            netdev_device_exclude: config.netdev_device_exclude.clone(),
            netdev_device_include: config.netdev_device_include.clone(),
        }
    }
}

pub type CollectorFactory = fn(&CollectorContext) -> Result<Box<dyn Collector>, CollectorError>;

/// Name → factory table.
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    factories: BTreeMap<&'static str, CollectorFactory>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four built-in collectors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("cpu", cpu::new_collector);
        registry.register("mem", meminfo::new_collector);
        registry.register("disk", filesystem::new_collector);
        registry.register("netio", netdev::new_collector);
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: CollectorFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn build(
        &self,
        name: &str,
        ctx: &CollectorContext,
    ) -> Result<Box<dyn Collector>, CollectorError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| CollectorError::Config(format!("unknown collector '{}'", name)))?;
        factory(ctx)
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_names() {
        let registry = CollectorRegistry::with_defaults();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["cpu", "disk", "mem", "netio"]);
        for name in DEFAULT_COLLECTORS {
            assert!(registry.contains(name));
        }
    }

    #[test]
    fn test_build_unknown_collector() {
        let registry = CollectorRegistry::with_defaults();
        let result = registry.build("thermal", &CollectorContext::default());
        assert!(matches!(result, Err(CollectorError::Config(_))));
    }

    #[test]
    fn test_no_data_classification() {
        assert!(CollectorError::NoData.is_no_data());
        assert!(!CollectorError::parse("meminfo", "bad").is_no_data());
    }
}
