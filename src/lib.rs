//! Herakles Push Exporter Library
//!
//! Samples Linux host metrics from procfs and `statfs(2)` and pushes them to a
//! Prometheus Pushgateway.
//!
//! # Features
//!
//! - **Concurrent collectors**: `cpu`, `mem`, `disk` and `netio` run side by side
//!   on every scrape, each reported with a duration and success meta sample
//! - **Stuck-mount watchdog**: a `statfs` call that hangs on a dead mount is
//!   abandoned after a timeout and the mount is quarantined
//! - **Pushgateway transport**: Prometheus text format POSTed per job/instance
//!
//! # Usage
//!
//! ```no_run
//! use herakles_push_exporter::collectors::{CollectorContext, CollectorRegistry};
//! use herakles_push_exporter::exposition::render_text;
//! use herakles_push_exporter::node::NodeCollector;
//!
//! let registry = CollectorRegistry::with_defaults();
//! let node = NodeCollector::from_registry(
//!     &registry,
//!     &["cpu", "mem"],
//!     &CollectorContext::default(),
//! )
//! .unwrap();
//!
//! let samples = node.collect_blocking();
//! println!("{}", render_text(&samples).unwrap());
//! ```

pub mod cli;
pub mod collectors;
pub mod commands;
pub mod config;
pub mod exposition;
pub mod node;
pub mod paths;
pub mod push;
pub mod sample;
pub mod startup_checks;
pub mod state;

// Re-export main types for convenience
pub use collectors::{Collector, CollectorError, CollectorRegistry};
pub use node::{NodeCollector, ScrapeOutcome, ScrapeStatus};
pub use push::{PushClient, PushError};
pub use sample::{Sample, SampleSink, ValueType};
