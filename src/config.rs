//! Configuration management for herakles-push-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use crate::collectors::{CollectorRegistry, DEFAULT_COLLECTORS};
use crate::paths::{ProcPaths, DEFAULT_PROCFS, DEFAULT_ROOTFS};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// Default configuration constants
pub const DEFAULT_GATEWAY: &str = "http://127.0.0.1:9091";
pub const DEFAULT_JOB: &str = "defaultJobName";
pub const DEFAULT_INSTANCE: &str = "defaultInstanceName";
pub const DEFAULT_PUSH_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_CPU_INTERVAL_MS: u64 = 100;
pub const DEFAULT_MOUNT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("{0}")]
    Invalid(String),
}

/// Effective configuration. Unset fields fall back to the defaults above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Push target
    pub gateway: Option<String>,
    pub job: Option<String>,
    /// Instance label in the push path; the host name is used when unset.
    pub instance: Option<String>,
    #[serde(alias = "push-interval")]
    pub push_interval: Option<u64>,

    // Collectors
    pub collectors: Option<Vec<String>>,
    #[serde(alias = "procfs-path")]
    pub procfs_path: Option<PathBuf>,
    #[serde(alias = "rootfs-path")]
    pub rootfs_path: Option<PathBuf>,
    #[serde(alias = "cpu-interval-ms")]
    pub cpu_interval_ms: Option<u64>,
    #[serde(alias = "mount-timeout-ms")]
    pub mount_timeout_ms: Option<u64>,
    #[serde(alias = "ignored-mount-points")]
    pub ignored_mount_points: Option<String>,
    #[serde(alias = "ignored-fs-types")]
    pub ignored_fs_types: Option<String>,
    #[serde(alias = "netdev-device-exclude")]
    pub netdev_device_exclude: Option<String>,
    #[serde(alias = "netdev-device-include")]
    pub netdev_device_include: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: Some(DEFAULT_GATEWAY.to_string()),
            job: Some(DEFAULT_JOB.to_string()),
            instance: None,
            push_interval: Some(DEFAULT_PUSH_INTERVAL_SECS),
            collectors: Some(DEFAULT_COLLECTORS.iter().map(|c| c.to_string()).collect()),
            procfs_path: Some(PathBuf::from(DEFAULT_PROCFS)),
            rootfs_path: Some(PathBuf::from(DEFAULT_ROOTFS)),
            cpu_interval_ms: Some(DEFAULT_CPU_INTERVAL_MS),
            mount_timeout_ms: Some(DEFAULT_MOUNT_TIMEOUT_MS),
            ignored_mount_points: None,
            ignored_fs_types: None,
            netdev_device_exclude: None,
            netdev_device_include: None,
        }
    }
}

impl Config {
    pub fn proc_paths(&self) -> ProcPaths {
        ProcPaths::new(
            self.procfs_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROCFS)),
            self.rootfs_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOTFS)),
        )
    }

    pub fn enabled_collectors(&self) -> Vec<String> {
        self.collectors
            .clone()
            .unwrap_or_else(|| DEFAULT_COLLECTORS.iter().map(|c| c.to_string()).collect())
    }

    pub fn gateway(&self) -> &str {
        self.gateway.as_deref().unwrap_or(DEFAULT_GATEWAY)
    }

    pub fn job(&self) -> &str {
        self.job.as_deref().unwrap_or(DEFAULT_JOB)
    }

    pub fn push_interval_secs(&self) -> u64 {
        self.push_interval.unwrap_or(DEFAULT_PUSH_INTERVAL_SECS)
    }
}

/// Instance name for the push path: configured value, else the host name.
pub fn resolve_instance(cfg: &Config) -> String {
    if let Some(instance) = &cfg.instance {
        return instance.clone();
    }
    match nix::unistd::gethostname() {
        Ok(name) => match name.into_string() {
            Ok(name) if !name.is_empty() => name,
            _ => DEFAULT_INSTANCE.to_string(),
        },
        Err(e) => {
            warn!("Failed to read host name, using {}: {}", DEFAULT_INSTANCE, e);
            DEFAULT_INSTANCE.to_string()
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(
    cfg: &Config,
    registry: &CollectorRegistry,
) -> Result<(), ConfigError> {
    let collectors = cfg.enabled_collectors();
    if collectors.is_empty() {
        return Err(ConfigError::Invalid(
            "At least one collector must be enabled".into(),
        ));
    }
    for name in &collectors {
        if !registry.contains(name) {
            let known: Vec<_> = registry.names().collect();
            return Err(ConfigError::Invalid(format!(
                "Unknown collector '{}', expected one of: {}",
                name,
                known.join(", ")
            )));
        }
    }

    let gateway = cfg.gateway();
    if !(gateway.starts_with("http://") || gateway.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!(
            "Invalid gateway '{}', expected an http:// or https:// URL",
            gateway
        )));
    }
    if cfg.job().is_empty() {
        return Err(ConfigError::Invalid("job must not be empty".into()));
    }
    if cfg.instance.as_deref() == Some("") {
        return Err(ConfigError::Invalid("instance must not be empty".into()));
    }

    if cfg.push_interval == Some(0) {
        return Err(ConfigError::Invalid("push_interval must be at least 1 second".into()));
    }
    if cfg.cpu_interval_ms == Some(0) {
        return Err(ConfigError::Invalid("cpu_interval_ms must be greater than 0".into()));
    }
    if cfg.mount_timeout_ms == Some(0) {
        return Err(ConfigError::Invalid("mount_timeout_ms must be greater than 0".into()));
    }

    let patterns = [
        ("ignored_mount_points", &cfg.ignored_mount_points),
        ("ignored_fs_types", &cfg.ignored_fs_types),
        ("netdev_device_exclude", &cfg.netdev_device_exclude),
        ("netdev_device_include", &cfg.netdev_device_include),
    ];
    for (field, pattern) in patterns {
        if let Some(pattern) = pattern {
            Regex::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("Invalid {} pattern: {}", field, e)))?;
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(gateway) = &args.gateway {
        config.gateway = Some(gateway.clone());
    }
    if let Some(job) = &args.job {
        config.job = Some(job.clone());
    }
    if let Some(instance) = &args.instance {
        config.instance = Some(instance.clone());
    }
    if let Some(interval) = args.push_interval {
        config.push_interval = Some(interval);
    }

    // Parse comma-separated collector list
    if let Some(collectors) = &args.collectors {
        config.collectors = Some(
            collectors
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        );
    }

    if let Some(procfs) = &args.procfs {
        config.procfs_path = Some(procfs.clone());
    }
    if let Some(rootfs) = &args.rootfs {
        config.rootfs_path = Some(rootfs.clone());
    }
    if let Some(timeout) = args.mount_timeout_ms {
        config.mount_timeout_ms = Some(timeout);
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            // Try default locations
            let defaults = [
                "/etc/herakles/push-exporter.yaml",
                "/etc/herakles/push-exporter.yml",
                "/etc/herakles/push-exporter.json",
                "./herakles-push-exporter.yaml",
                "./herakles-push-exporter.yml",
                "./herakles-push-exporter.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;

    parse_config(&content, path.extension().and_then(|s| s.to_str())).map(|config| {
        info!("Loaded configuration from: {}", path.display());
        config
    })
}

/// Parses configuration text; the extension picks the format, YAML by default.
pub fn parse_config(content: &str, extension: Option<&str>) -> Result<Config, ConfigError> {
    let config = match extension {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Renders configuration in the requested format.
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String, ConfigError> {
    match format {
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))
        }
        ConfigFormat::Toml => {
            toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))
        }
        ConfigFormat::Yaml => {
            serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let registry = CollectorRegistry::with_defaults();
        assert!(validate_effective_config(&Config::default(), &registry).is_ok());
    }

    #[test]
    fn test_unknown_collector_is_rejected() {
        let registry = CollectorRegistry::with_defaults();
        let config = Config {
            collectors: Some(vec!["cpu".into(), "thermal".into()]),
            ..Config::default()
        };
        let err = validate_effective_config(&config, &registry).unwrap_err();
        assert!(err.to_string().contains("thermal"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let registry = CollectorRegistry::with_defaults();
        let config = Config {
            ignored_fs_types: Some("^(ext4".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&config, &registry).is_err());
    }

    #[test]
    fn test_gateway_scheme_is_required() {
        let registry = CollectorRegistry::with_defaults();
        let config = Config {
            gateway: Some("pushgw:9091".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&config, &registry).is_err());
    }

    #[test]
    fn test_parse_yaml_with_aliases() {
        let yaml = "gateway: http://pushgw:9091\njob: node\nmount-timeout-ms: 250\ncollectors: [cpu, disk]\n";
        let config = parse_config(yaml, Some("yaml")).unwrap();
        assert_eq!(config.gateway(), "http://pushgw:9091");
        assert_eq!(config.job(), "node");
        assert_eq!(config.mount_timeout_ms, Some(250));
        assert_eq!(config.enabled_collectors(), vec!["cpu", "disk"]);
        // fields missing from the file stay unset
        assert_eq!(config.push_interval, None);
        assert_eq!(config.push_interval_secs(), DEFAULT_PUSH_INTERVAL_SECS);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"job": "from-file", "push_interval": 10}}"#).unwrap();

        let args = Args::parse_from([
            "herakles-push-exporter",
            "--config",
            file.path().to_str().unwrap(),
            "--job",
            "from-cli",
            "--collectors",
            "mem, netio",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.job(), "from-cli");
        assert_eq!(config.push_interval_secs(), 10);
        assert_eq!(config.enabled_collectors(), vec!["mem", "netio"]);
    }

    #[test]
    fn test_configured_instance_wins_over_hostname() {
        let config = Config {
            instance: Some("edge-01".into()),
            ..Config::default()
        };
        assert_eq!(resolve_instance(&config), "edge-01");
        assert!(!resolve_instance(&Config::default()).is_empty());
    }

    #[test]
    fn test_render_round_trips_through_toml() {
        let rendered = render_config(&Config::default(), ConfigFormat::Toml).unwrap();
        let parsed = parse_config(&rendered, Some("toml")).unwrap();
        assert_eq!(parsed.gateway(), DEFAULT_GATEWAY);
        assert_eq!(parsed.mount_timeout_ms, Some(DEFAULT_MOUNT_TIMEOUT_MS));
    }
}
