//! Per-CPU usage collector.
//!
//! Takes two snapshots of `/proc/stat` a short interval apart and reports the
//! busy share of every CPU over that window.

use std::collections::BTreeMap;
use std::fs;
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::{Collector, CollectorContext, CollectorError};
use crate::paths::ProcPaths;
use crate::sample::{build_fq_name, Sample, SampleSink, NAMESPACE};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

const CPU_SUBSYSTEM: &str = "cpu";
const CPU_USAGE_HELP: &str = "CPU usage percentage over the sampling interval.";

/// Accounting fields of one `cpuN` line, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
}

impl CpuTimes {
    pub fn total(&self) -> f64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq
    }
}

/// Parses the per-CPU lines of `/proc/stat`, keyed by CPU number.
///
/// The aggregate `cpu` line and lines with fewer than seven counters are skipped.
pub fn parse_cpu_times(content: &str) -> Result<BTreeMap<u32, CpuTimes>, CollectorError> {
    let mut cpus = BTreeMap::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(id) = parts.first().and_then(|name| name.strip_prefix("cpu")) else {
            continue;
        };
        if id.is_empty() || parts.len() < 8 {
            continue;
        }

        let id: u32 = id
            .parse()
            .map_err(|e| CollectorError::parse("cpu line in stat", format!("{}: {:?}", e, line)))?;

        let mut fields = [0.0_f64; 7];
        for (slot, raw) in fields.iter_mut().zip(&parts[1..8]) {
            *slot = raw.parse().map_err(|e| {
                CollectorError::parse("cpu field in stat", format!("{}: {:?}", e, raw))
            })?;
        }

        cpus.insert(
            id,
            CpuTimes {
                user: fields[0],
                nice: fields[1],
                system: fields[2],
                idle: fields[3],
                iowait: fields[4],
                irq: fields[5],
                softirq: fields[6],
            },
        );
    }

    Ok(cpus)
}

/// Busy percentage per CPU between two snapshots.
///
/// Returns `NoData` when CPUs disappeared between the snapshots. Values are
/// not clamped: counter anomalies can push them outside `[0, 100]`.
pub fn cpu_usage(
    start: &BTreeMap<u32, CpuTimes>,
    end: &BTreeMap<u32, CpuTimes>,
) -> Result<Vec<(u32, f64)>, CollectorError> {
    if end.len() < start.len() {
        return Err(CollectorError::NoData);
    }

    let mut usage = Vec::with_capacity(start.len());
    for (id, s) in start {
        let Some(e) = end.get(id) else {
            continue;
        };
        let value = if e.idle == s.idle {
            0.0
        } else {
            let total_delta = e.total() - s.total();
            100.0 - (e.idle - s.idle) / total_delta * 100.0
        };
        usage.push((*id, value));
    }

    Ok(usage)
}

/// Renders the sampling window the way it appears in the `interval` label.
fn interval_label(interval: Duration) -> String {
    let millis = interval.as_millis();
    if millis >= 1000 && millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

pub struct CpuCollector {
    paths: ProcPaths,
    interval: Duration,
    usage_name: String,
}

impl CpuCollector {
    pub fn new(ctx: &CollectorContext) -> Self {
        Self {
            paths: ctx.paths.clone(),
            interval: ctx.cpu_interval,
            usage_name: build_fq_name(NAMESPACE, CPU_SUBSYSTEM, "usage"),
        }
    }

    fn snapshot(&self) -> Result<BTreeMap<u32, CpuTimes>, CollectorError> {
        let path = self.paths.proc_file("stat");
        let content = fs::read_to_string(&path).map_err(|e| CollectorError::io(&path, e))?;
        parse_cpu_times(&content)
    }
}

impl Collector for CpuCollector {
    fn update(&self, sink: &SampleSink) -> Result<(), CollectorError> {
        let start = self.snapshot()?;
        thread::sleep(self.interval);
        let end = self.snapshot()?;

        if end.len() < start.len() {
            debug!(
                "CPU count dropped from {} to {} during sampling window",
                start.len(),
                end.len()
            );
        }

        let interval = interval_label(self.interval);
        for (cpu, usage) in cpu_usage(&start, &end)? {
            sink.emit(
                Sample::counter(self.usage_name.as_str(), CPU_USAGE_HELP, usage)
                    .with_label("cpu", cpu.to_string())
                    .with_label("interval", interval.as_str()),
            );
        }

        Ok(())
    }
}

pub fn new_collector(ctx: &CollectorContext) -> Result<Box<dyn Collector>, CollectorError> {
    Ok(Box::new(CpuCollector::new(ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_START: &str = "cpu  200 0 100 1000 10 0 5 0 0 0
cpu0 100 0 50 500 5 0 2 0 0 0
cpu1 100 0 50 500 5 0 3 0 0 0
intr 12345
ctxt 6789
";

    #[test]
    fn test_parse_cpu_times_skips_aggregate() {
        let cpus = parse_cpu_times(STAT_START).unwrap();
        assert_eq!(cpus.len(), 2);
        assert_eq!(cpus[&0].user, 100.0);
        assert_eq!(cpus[&0].idle, 500.0);
        assert_eq!(cpus[&1].softirq, 3.0);
        assert_eq!(cpus[&0].total(), 657.0);
    }

    #[test]
    fn test_parse_cpu_times_rejects_garbage() {
        let result = parse_cpu_times("cpu0 1 2 x 4 5 6 7\n");
        assert!(matches!(result, Err(CollectorError::Parse { .. })));
    }

    #[test]
    fn test_identical_snapshots_report_zero() {
        let snapshot = parse_cpu_times(STAT_START).unwrap();
        let usage = cpu_usage(&snapshot, &snapshot).unwrap();
        assert_eq!(usage, vec![(0, 0.0), (1, 0.0)]);
    }

    #[test]
    fn test_usage_over_window() {
        let start = parse_cpu_times("cpu0 100 0 0 100 0 0 0\n").unwrap();
        // 100 ticks elapsed, 25 of them idle
        let end = parse_cpu_times("cpu0 175 0 0 125 0 0 0\n").unwrap();
        let usage = cpu_usage(&start, &end).unwrap();
        assert_eq!(usage.len(), 1);
        assert!((usage[0].1 - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_unplugged_is_no_data() {
        let start = parse_cpu_times(STAT_START).unwrap();
        let end = parse_cpu_times("cpu0 100 0 50 600 5 0 2\n").unwrap();
        let result = cpu_usage(&start, &end);
        assert!(matches!(result, Err(CollectorError::NoData)));
    }

    #[test]
    fn test_usage_is_not_clamped() {
        // idle advanced while the total went backwards (counter wrap)
        let start = parse_cpu_times("cpu0 1000 0 0 100 0 0 0\n").unwrap();
        let end = parse_cpu_times("cpu0 0 0 0 200 0 0 0\n").unwrap();
        let usage = cpu_usage(&start, &end).unwrap();
        assert!(usage[0].1 > 100.0);
    }

    #[test]
    fn test_interval_label() {
        assert_eq!(interval_label(Duration::from_millis(100)), "100ms");
        assert_eq!(interval_label(Duration::from_secs(2)), "2s");
        assert_eq!(interval_label(Duration::from_millis(1500)), "1500ms");
    }
}
