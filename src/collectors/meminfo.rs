//! Memory usage collector reading `/proc/meminfo`.

use std::fs;

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Collector, CollectorContext, CollectorError};
use crate::paths::ProcPaths;
use crate::sample::{build_fq_name, Sample, SampleSink, NAMESPACE};

const MEMINFO_SUBSYSTEM: &str = "memory";

// Active(anon) -> Active_anon
static QUALIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((.*)\)").expect("qualifier pattern is valid"));

/// Parses `/proc/meminfo` into `key -> value`.
///
/// Values carrying a unit are assumed to be kB; they are converted to bytes
/// and their key gets a `_bytes` suffix.
pub fn parse_meminfo(content: &str) -> Result<HashMap<String, f64>, CollectorError> {
    let mut mem_info = HashMap::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if parts.len() < 2 {
            return Err(CollectorError::parse("line in meminfo", line));
        }

        let mut value: f64 = parts[1].parse().map_err(|e| {
            CollectorError::parse("value in meminfo", format!("{}: {:?}", e, parts[1]))
        })?;

        let key = parts[0].strip_suffix(':').unwrap_or(parts[0]);
        let mut key = QUALIFIER_RE.replace_all(key, "_${1}").into_owned();

        match parts.len() {
            2 => {}
            3 => {
                value *= 1024.0;
                key.push_str("_bytes");
            }
            _ => return Err(CollectorError::parse("line in meminfo", line)),
        }

        mem_info.insert(key, value);
    }

    Ok(mem_info)
}

/// Share of memory in use: everything that is neither free, cached nor buffers.
pub fn memory_usage(mem_info: &HashMap<String, f64>) -> Result<f64, CollectorError> {
    let field = |name: &str| mem_info.get(name).copied().unwrap_or(0.0);

    let total = field("MemTotal_bytes");
    if total <= 0.0 {
        return Err(CollectorError::parse(
            "meminfo",
            "MemTotal is missing or zero",
        ));
    }

    let reclaimable = field("MemFree_bytes") + field("Cached_bytes") + field("Buffers_bytes");
    Ok(100.0 - reclaimable / total * 100.0)
}

pub struct MeminfoCollector {
    paths: ProcPaths,
    usage_name: String,
}

impl MeminfoCollector {
    pub fn new(ctx: &CollectorContext) -> Self {
        Self {
            paths: ctx.paths.clone(),
            usage_name: build_fq_name(NAMESPACE, MEMINFO_SUBSYSTEM, "usage"),
        }
    }

    fn get_mem_info(&self) -> Result<HashMap<String, f64>, CollectorError> {
        let path = self.paths.proc_file("meminfo");
        let content = fs::read_to_string(&path).map_err(|e| CollectorError::io(&path, e))?;
        parse_meminfo(&content)
    }
}

impl Collector for MeminfoCollector {
    fn update(&self, sink: &SampleSink) -> Result<(), CollectorError> {
        let mem_info = self.get_mem_info()?;
        let usage = memory_usage(&mem_info)?;
        sink.emit(Sample::gauge(
            self.usage_name.as_str(),
            "Memory usage percentage.",
            usage,
        ));
        Ok(())
    }
}

pub fn new_collector(ctx: &CollectorContext) -> Result<Box<dyn Collector>, CollectorError> {
    Ok(Box::new(MeminfoCollector::new(ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_key_is_rewritten() {
        let info = parse_meminfo("Active(anon):       1234 kB\n").unwrap();
        assert_eq!(info.get("Active_anon_bytes"), Some(&(1234.0 * 1024.0)));
    }

    #[test]
    fn test_unitless_value_is_kept() {
        let info = parse_meminfo("HugePages_Total:       8\n").unwrap();
        assert_eq!(info.get("HugePages_Total"), Some(&8.0));
    }

    #[test]
    fn test_usage_from_meminfo() {
        let info = parse_meminfo(
            "MemTotal:        1000 kB
MemFree:          200 kB
MemAvailable:     600 kB
Buffers:           50 kB
Cached:           100 kB
",
        )
        .unwrap();
        let usage = memory_usage(&info).unwrap();
        assert!((usage - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_value_is_error() {
        let result = parse_meminfo("MemTotal:  lots kB\n");
        assert!(matches!(result, Err(CollectorError::Parse { .. })));
    }

    #[test]
    fn test_too_many_fields_is_error() {
        let result = parse_meminfo("MemTotal: 1000 kB extra\n");
        assert!(matches!(result, Err(CollectorError::Parse { .. })));
    }

    #[test]
    fn test_missing_total_is_error() {
        let info = parse_meminfo("MemFree: 200 kB\n").unwrap();
        assert!(memory_usage(&info).is_err());
    }
}
