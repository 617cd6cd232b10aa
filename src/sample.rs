//! Samples emitted by collectors and the sink they are emitted into.
//!
//! A scrape produces a flat, ordered list of [`Sample`] values. Collectors run
//! concurrently and push into a shared [`SampleSink`]; the orchestrator drains
//! the sink once every collector has finished.

use std::sync::{Mutex, MutexGuard};

/// Prefix applied to every metric name exported by this agent.
pub const NAMESPACE: &str = "herakles_push";

/// Prometheus value type of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Counter,
    Gauge,
}

/// A single named, labeled value.
///
/// Two samples are the same series when `name` and `labels` match.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub help: &'static str,
    pub value_type: ValueType,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    pub fn gauge(name: impl Into<String>, help: &'static str, value: f64) -> Self {
        Self {
            name: name.into(),
            help,
            value_type: ValueType::Gauge,
            labels: Vec::new(),
            value,
        }
    }

    pub fn counter(name: impl Into<String>, help: &'static str, value: f64) -> Self {
        Self {
            name: name.into(),
            help,
            value_type: ValueType::Counter,
            labels: Vec::new(),
            value,
        }
    }

    /// Appends a label, keeping insertion order.
    pub fn with_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.push((key.to_string(), value.into()));
        self
    }

    /// Returns the value of the label `key`, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Joins non-empty name components with `_`, e.g. `herakles_push_cpu_usage`.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Thread-safe, append-only collection of samples for one scrape.
#[derive(Debug, Default)]
pub struct SampleSink {
    samples: Mutex<Vec<Sample>>,
}

impl SampleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, sample: Sample) {
        self.lock().push(sample);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies the samples emitted so far.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.lock().clone()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // A collector that panicked mid-emit must not take the rest of the scrape with it.
    fn lock(&self) -> MutexGuard<'_, Vec<Sample>> {
        self.samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
