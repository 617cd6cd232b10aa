//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from(match format {
            ConfigFormat::Yaml => "herakles-push-exporter.yaml",
            ConfigFormat::Json => "herakles-push-exporter.json",
            ConfigFormat::Toml => "herakles-push-exporter.toml",
        }),
    };

    let mut content = render_config(&config, format)?;
    if commented {
        content = add_config_comments(format, content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Prepends a commented reference of every option. JSON has no comments and
/// is returned unchanged.
fn add_config_comments(format: ConfigFormat, content: String) -> String {
    let comments = r#"# Herakles Push Exporter Configuration
# =====================================
#
# Push Target
# -----------
# gateway: "http://127.0.0.1:9091"  # Pushgateway base URL
# job: "defaultJobName"             # Job segment of the push path
# instance: null                    # Instance segment (null = host name)
# push_interval: 2                  # Seconds between pushes
#
# Collectors
# ----------
# collectors: [cpu, mem, disk, netio]
# procfs_path: "/proc"              # Root of the proc filesystem
# rootfs_path: "/"                  # Root used to resolve mount points for statfs
# cpu_interval_ms: 100              # Window between the two /proc/stat snapshots
# mount_timeout_ms: 5000            # statfs deadline before a mount is marked stuck
# ignored_mount_points: null        # Regex, default skips /dev, /proc, /sys, docker
# ignored_fs_types: null            # Regex, default skips pseudo filesystems
# netdev_device_exclude: null       # Regex of interfaces to leave out
# netdev_device_include: null       # Regex of interfaces to keep
"#;

    match format {
        ConfigFormat::Json => content,
        ConfigFormat::Yaml | ConfigFormat::Toml => format!("{comments}\n{content}"),
    }
}
