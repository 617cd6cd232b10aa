//! CLI command implementations for herakles-push-exporter.
//!
//! This module provides implementations for the CLI subcommands:
//! - `test`: Scrape cycles printed to stdout
//! - `config`: Configuration file generation
//!
//! `check-requirements` lives in [`crate::startup_checks`].

pub mod config;

// Re-export command functions
pub use config::command_config;
pub use test::command_test;
