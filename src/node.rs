//! Scrape orchestration.
//!
//! [`NodeCollector`] runs every enabled collector concurrently, waits for all
//! of them, and adds two meta samples per collector describing how long it
//! took and whether it succeeded.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, error, instrument};

use crate::collectors::{Collector, CollectorContext, CollectorError, CollectorRegistry};
use crate::sample::{build_fq_name, Sample, SampleSink, NAMESPACE};

const SCRAPE_SUBSYSTEM: &str = "scrape";
const DURATION_HELP: &str = "herakles_push_exporter: Duration of a collector scrape.";
const SUCCESS_HELP: &str = "herakles_push_exporter: Whether a collector succeeded.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStatus {
    Success,
    NoData,
    Error,
}

impl ScrapeStatus {
    fn classify(result: &Result<(), CollectorError>) -> Self {
        match result {
            Ok(()) => ScrapeStatus::Success,
            Err(e) if e.is_no_data() => ScrapeStatus::NoData,
            Err(_) => ScrapeStatus::Error,
        }
    }

    pub fn success_value(self) -> f64 {
        match self {
            ScrapeStatus::Success => 1.0,
            ScrapeStatus::NoData | ScrapeStatus::Error => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub collector: String,
    pub duration: Duration,
    pub status: ScrapeStatus,
}

/// Everything one scrape produced: collector samples followed by meta samples.
#[derive(Debug, Default)]
pub struct Scrape {
    pub samples: Vec<Sample>,
    pub outcomes: Vec<ScrapeOutcome>,
}

pub struct NodeCollector {
    collectors: Vec<(String, Arc<dyn Collector>)>,
    duration_name: String,
    success_name: String,
}

impl NodeCollector {
    pub fn new(collectors: Vec<(String, Arc<dyn Collector>)>) -> Self {
        Self {
            collectors,
            duration_name: build_fq_name(NAMESPACE, SCRAPE_SUBSYSTEM, "collector_duration_seconds"),
            success_name: build_fq_name(NAMESPACE, SCRAPE_SUBSYSTEM, "collector_success"),
        }
    }

    /// Builds the enabled collectors from `registry`.
    ///
    /// An unknown name or a failing factory aborts construction.
    pub fn from_registry<S: AsRef<str>>(
        registry: &CollectorRegistry,
        enabled: &[S],
        ctx: &CollectorContext,
    ) -> Result<Self, CollectorError> {
        let mut collectors: Vec<(String, Arc<dyn Collector>)> = Vec::with_capacity(enabled.len());
        for name in enabled {
            let name = name.as_ref();
            if collectors.iter().any(|(existing, _)| existing == name) {
                debug!(collector = name, "Collector listed twice, keeping one");
                continue;
            }
            let collector = registry.build(name, ctx)?;
            debug!(collector = name, "Collector enabled");
            collectors.push((name.to_string(), Arc::from(collector)));
        }
        Ok(Self::new(collectors))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collectors.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Runs every collector on the blocking pool and waits for all of them.
    #[instrument(skip(self), fields(collectors = self.collectors.len()))]
    pub async fn scrape(&self) -> Scrape {
        let sink = Arc::new(SampleSink::new());
        let mut workers = JoinSet::new();

        for (index, (name, collector)) in self.collectors.iter().enumerate() {
            let name = name.clone();
            let collector = Arc::clone(collector);
            let sink = Arc::clone(&sink);
            workers.spawn_blocking(move || (index, execute(&name, collector.as_ref(), &sink)));
        }

        let mut finished: Vec<Option<ScrapeOutcome>> = vec![None; self.collectors.len()];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => finished[index] = Some(outcome),
                // execute() catches panics; a join error means the task was aborted
                Err(e) => error!("Collector worker failed to join: {}", e),
            }
        }

        let outcomes = self
            .collectors
            .iter()
            .zip(finished)
            .map(|((name, _), outcome)| {
                outcome.unwrap_or_else(|| ScrapeOutcome {
                    collector: name.clone(),
                    duration: Duration::ZERO,
                    status: ScrapeStatus::Error,
                })
            })
            .collect();

        self.finish(sink, outcomes)
    }

    /// [`scrape`](Self::scrape) without a runtime: one scoped thread per collector.
    pub fn scrape_blocking(&self) -> Scrape {
        let sink = SampleSink::new();
        let outcomes = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .collectors
                .iter()
                .map(|(name, collector)| {
                    let sink = &sink;
                    scope.spawn(move || execute(name, collector.as_ref(), sink))
                })
                .collect();

            handles
                .into_iter()
                .zip(&self.collectors)
                .map(|(handle, (name, _))| {
                    handle.join().unwrap_or_else(|_| ScrapeOutcome {
                        collector: name.clone(),
                        duration: Duration::ZERO,
                        status: ScrapeStatus::Error,
                    })
                })
                .collect()
        });

        self.finish(Arc::new(sink), outcomes)
    }

    pub async fn collect(&self) -> Vec<Sample> {
        self.scrape().await.samples
    }

    pub fn collect_blocking(&self) -> Vec<Sample> {
        self.scrape_blocking().samples
    }

    fn finish(&self, sink: Arc<SampleSink>, outcomes: Vec<ScrapeOutcome>) -> Scrape {
        let mut samples = match Arc::try_unwrap(sink) {
            Ok(sink) => sink.into_samples(),
            Err(shared) => shared.snapshot(),
        };

        for outcome in &outcomes {
            samples.push(
                Sample::gauge(
                    self.duration_name.as_str(),
                    DURATION_HELP,
                    outcome.duration.as_secs_f64(),
                )
                .with_label("collector", outcome.collector.as_str()),
            );
            samples.push(
                Sample::gauge(
                    self.success_name.as_str(),
                    SUCCESS_HELP,
                    outcome.status.success_value(),
                )
                .with_label("collector", outcome.collector.as_str()),
            );
        }

        Scrape { samples, outcomes }
    }
}

/// Runs one collector, timing it and turning a panic into an error.
fn execute(name: &str, collector: &dyn Collector, sink: &SampleSink) -> ScrapeOutcome {
    let begin = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| collector.update(sink)))
        .unwrap_or_else(|payload| Err(CollectorError::Panicked(panic_message(&*payload))));
    let duration = begin.elapsed();

    let status = ScrapeStatus::classify(&result);
    match &result {
        Ok(()) => debug!(
            collector = name,
            duration_seconds = duration.as_secs_f64(),
            "collector succeeded"
        ),
        Err(e) if e.is_no_data() => debug!(collector = name, "collector returned no data: {}", e),
        Err(e) => error!(collector = name, "collector failed: {}", e),
    }

    ScrapeOutcome {
        collector: name.to_string(),
        duration,
        status,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
