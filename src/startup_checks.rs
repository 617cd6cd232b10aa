//! Startup requirement validation for herakles-push-exporter.
//!
//! This module checks that the procfs inputs of the enabled collectors are
//! readable before the push loop starts.

use nix::unistd::geteuid;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::paths::ProcPaths;

/// Procfs files read by each collector.
fn required_files(collector: &str) -> &'static [&'static str] {
    match collector {
        "cpu" => &["stat"],
        "mem" => &["meminfo"],
        "disk" => &["mounts"],
        "netio" => &["net/dev"],
        _ => &[],
    }
}

/// Validate all runtime requirements
pub fn validate_requirements<S: AsRef<str>>(
    paths: &ProcPaths,
    collectors: &[S],
) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();

    let mut unreadable = Vec::new();
    for collector in collectors {
        for file in required_files(collector.as_ref()) {
            let path = paths.proc_file(file);
            if !check_proc_file(collector.as_ref(), &path) {
                unreadable.push(path);
            }
        }
    }

    if !unreadable.is_empty() {
        return Err(ValidationError::UnreadableInputs(unreadable));
    }

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - statfs may fail on restricted mount points");
        warn!("   Recommendation: Run as root for full filesystem coverage");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

fn check_proc_file(collector: &str, path: &Path) -> bool {
    match fs::read(path) {
        Ok(_) => {
            info!("✅ {}: {} is readable", collector, path.display());
            true
        }
        Err(e) => {
            error!("❌ {}: cannot read {}: {}", collector, path.display(), e);
            if e.kind() == std::io::ErrorKind::NotFound {
                error!("   Is procfs mounted? Use --procfs to point at a different root.");
            }
            false
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("unreadable collector inputs: {0:?}")]
    UnreadableInputs(Vec<PathBuf>),
}
