//! Network interface statistics collector.
//!
//! This module reads network interface statistics from /proc/net/dev and
//! exposes the total traffic across all interfaces.

use std::collections::BTreeMap;
use std::fs;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Collector, CollectorContext, CollectorError};
use crate::paths::ProcPaths;
use crate::sample::{build_fq_name, Sample, SampleSink, NAMESPACE};

const NETDEV_SUBSYSTEM: &str = "network";

static INTERFACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+): *(.+)$").expect("interface pattern is valid"));
static FIELD_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").expect("separator is valid"));

/// Per-interface raw counters, e.g. `stats["eth0"]["receive_bytes"]`.
pub type NetDevStats = BTreeMap<String, BTreeMap<String, String>>;

/// Parses /proc/net/dev.
///
/// The second header line names the receive and transmit columns; every
/// interface line must carry exactly that many values. Interfaces matching
/// `ignore`, or not matching `accept`, are left out.
pub fn parse_netdev_stats(
    content: &str,
    ignore: Option<&Regex>,
    accept: Option<&Regex>,
) -> Result<NetDevStats, CollectorError> {
    let mut lines = content.lines();
    lines.next(); // skip first header
    let header = lines.next().unwrap_or_default();

    let parts: Vec<&str> = header.split('|').collect();
    if parts.len() != 3 {
        // interface + receive + transmit
        return Err(CollectorError::parse("header line in net/dev", header));
    }

    let receive_header: Vec<&str> = parts[1].split_whitespace().collect();
    let transmit_header: Vec<&str> = parts[2].split_whitespace().collect();
    let header_length = receive_header.len() + transmit_header.len();

    let mut net_dev = NetDevStats::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let caps = INTERFACE_RE.captures(line).ok_or_else(|| {
            CollectorError::parse("interface line in net/dev", format!("{:?}", line))
        })?;
        let dev = &caps[1];

        if ignore.is_some_and(|re| re.is_match(dev)) {
            continue;
        }
        if accept.is_some_and(|re| !re.is_match(dev)) {
            continue;
        }

        let values: Vec<&str> = FIELD_SEP_RE.split(caps[2].trim_start()).collect();
        if values.len() != header_length {
            return Err(CollectorError::parse(
                "values line in net/dev",
                format!("{:?}", &caps[2]),
            ));
        }

        let fields = net_dev.entry(dev.to_string()).or_default();
        for (name, value) in receive_header.iter().zip(&values) {
            fields.insert(format!("receive_{}", name), value.to_string());
        }
        for (name, value) in transmit_header.iter().zip(&values[receive_header.len()..]) {
            fields.insert(format!("transmit_{}", name), value.to_string());
        }
    }

    Ok(net_dev)
}

/// Received plus transmitted bytes over all interfaces, in megabytes.
///
/// This is a cumulative total since boot, not a rate.
pub fn total_traffic_megabytes(stats: &NetDevStats) -> Result<f64, CollectorError> {
    let mut total = 0.0;
    for fields in stats.values() {
        for (key, value) in fields {
            if key != "receive_bytes" && key != "transmit_bytes" {
                continue;
            }
            let v: f64 = value.parse().map_err(|e| {
                CollectorError::parse("value in net/dev", format!("{}: {:?}", e, value))
            })?;
            total += v;
        }
    }
    // Bytes => MB
    Ok(total / 1024.0 / 1024.0)
}

pub struct NetDevCollector {
    paths: ProcPaths,
    device_exclude: Option<Regex>,
    device_include: Option<Regex>,
    netio_name: String,
}

impl NetDevCollector {
    pub fn new(ctx: &CollectorContext) -> Result<Self, CollectorError> {
        let compile = |pattern: &Option<String>| -> Result<Option<Regex>, CollectorError> {
            pattern
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|e| CollectorError::Config(format!("netdev device pattern: {}", e)))
        };

        Ok(Self {
            paths: ctx.paths.clone(),
            device_exclude: compile(&ctx.netdev_device_exclude)?,
            device_include: compile(&ctx.netdev_device_include)?,
            netio_name: build_fq_name(NAMESPACE, NETDEV_SUBSYSTEM, "netio"),
        })
    }

    fn get_net_dev_stats(&self) -> Result<NetDevStats, CollectorError> {
        let path = self.paths.proc_file("net/dev");
        let content = fs::read_to_string(&path).map_err(|e| CollectorError::io(&path, e))?;
        parse_netdev_stats(
            &content,
            self.device_exclude.as_ref(),
            self.device_include.as_ref(),
        )
    }
}

impl Collector for NetDevCollector {
    fn update(&self, sink: &SampleSink) -> Result<(), CollectorError> {
        let stats = self.get_net_dev_stats()?;
        let megabytes = total_traffic_megabytes(&stats)?;
        sink.emit(Sample::gauge(
            self.netio_name.as_str(),
            "Network I/O (MB).",
            megabytes,
        ));
        Ok(())
    }
}

pub fn new_collector(ctx: &CollectorContext) -> Result<Box<dyn Collector>, CollectorError> {
    Ok(Box::new(NetDevCollector::new(ctx)?))
}
