//! CLI arguments and subcommands for herakles-push-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug, Default)]
#[command(
    name = "herakles-push-exporter",
    about = "Pushes Linux host CPU, memory, filesystem and network usage to a Prometheus Pushgateway",
    long_about = "Pushes Linux host CPU, memory, filesystem and network usage to a Prometheus Pushgateway.\n\n\
                  Every push interval all enabled collectors run concurrently, their samples are \
                  rendered in the Prometheus text format and POSTed to \
                  <gateway>/metrics/job/<job>/instance/<instance>.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Pushgateway base URL
    #[arg(short = 'g', long)]
    pub gateway: Option<String>,

    /// Job name used in the push path
    #[arg(long)]
    pub job: Option<String>,

    /// Instance name used in the push path (default: host name)
    #[arg(long)]
    pub instance: Option<String>,

    /// Seconds between two pushes
    #[arg(long)]
    pub push_interval: Option<u64>,

    /// Enabled collectors (comma-separated: cpu,mem,disk,netio)
    #[arg(long)]
    pub collectors: Option<String>,

    /// Root of the proc filesystem
    #[arg(long)]
    pub procfs: Option<PathBuf>,

    /// Root of the host filesystem used for statfs calls
    #[arg(long)]
    pub rootfs: Option<PathBuf>,

    /// Milliseconds a statfs call may take before its mount is marked as stuck
    #[arg(long)]
    pub mount_timeout_ms: Option<u64>,

    /// Collect and push once, then exit
    #[arg(long)]
    pub once: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl Default for ConfigFormat {
    fn default() -> Self {
        ConfigFormat::Yaml
    }
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scrape cycles and print the rendered metrics instead of pushing
    Test {
        /// Number of scrape cycles
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Show per-collector duration and status
        #[arg(long)]
        verbose: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Check that the procfs inputs are readable
    CheckRequirements,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_push_flags() {
        let args = Args::parse_from([
            "herakles-push-exporter",
            "--gateway",
            "http://pushgw:9091",
            "--job",
            "node",
            "--collectors",
            "cpu,mem",
            "--once",
        ]);
        assert_eq!(args.gateway.as_deref(), Some("http://pushgw:9091"));
        assert_eq!(args.job.as_deref(), Some("node"));
        assert_eq!(args.collectors.as_deref(), Some("cpu,mem"));
        assert!(args.once);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_parse_test_subcommand() {
        let args = Args::parse_from(["herakles-push-exporter", "test", "-n", "3", "--verbose"]);
        match args.command {
            Some(Commands::Test {
                iterations,
                verbose,
            }) => {
                assert_eq!(iterations, 3);
                assert!(verbose);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
