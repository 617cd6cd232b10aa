//! Prometheus text exposition of a scrape.
//!
//! Samples are loaded into a throwaway [`Registry`] per scrape and rendered
//! with the `prometheus` crate's [`TextEncoder`], so the pushed body is
//! exactly what a Prometheus client library would serve.

use ahash::AHashMap as HashMap;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::{debug, warn};

use crate::sample::{Sample, ValueType};

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExpositionError {
    #[error("failed to build metric family: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("encoded metrics are not valid UTF-8")]
    EncodingFailed,
}

enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

struct FamilyEntry {
    value_type: ValueType,
    label_keys: Vec<String>,
    family: Family,
}

/// Renders samples in the Prometheus text format.
///
/// All samples sharing a name form one family; its label keys are taken from
/// the first sample. Samples that disagree with their family on labels or
/// type, and counters with a negative or NaN value, are dropped with a
/// warning. A repeated series keeps its last value.
pub fn render_text(samples: &[Sample]) -> Result<String, ExpositionError> {
    let registry = Registry::new();
    let mut families: HashMap<&str, FamilyEntry> = HashMap::new();

    for sample in samples {
        if sample.label("job").is_some() {
            warn!(
                metric = %sample.name,
                "Sample already contains a job label, the pushgateway will override it"
            );
        }

        if !families.contains_key(sample.name.as_str()) {
            let entry = new_family(sample)?;
            let collector: Box<dyn prometheus::core::Collector> = match &entry.family {
                Family::Gauge(vec) => Box::new(vec.clone()),
                Family::Counter(vec) => Box::new(vec.clone()),
            };
            registry.register(collector)?;
            families.insert(sample.name.as_str(), entry);
        }
        let Some(entry) = families.get(sample.name.as_str()) else {
            continue;
        };

        if entry.value_type != sample.value_type {
            warn!(metric = %sample.name, "Sample type differs from its family, dropping it");
            continue;
        }
        let keys_match = entry.label_keys.len() == sample.labels.len()
            && entry
                .label_keys
                .iter()
                .zip(&sample.labels)
                .all(|(key, (label, _))| key == label);
        if !keys_match {
            warn!(metric = %sample.name, "Sample labels differ from its family, dropping it");
            continue;
        }

        let values: Vec<&str> = sample.labels.iter().map(|(_, v)| v.as_str()).collect();
        match &entry.family {
            Family::Gauge(vec) => vec.with_label_values(values.as_slice()).set(sample.value),
            Family::Counter(vec) => {
                if sample.value.is_nan() || sample.value < 0.0 {
                    warn!(
                        metric = %sample.name,
                        value = sample.value,
                        "Counter value cannot be exposed, dropping it"
                    );
                    continue;
                }
                let counter = vec.with_label_values(values.as_slice());
                counter.reset();
                counter.inc_by(sample.value);
            }
        }
    }

    let metric_families = registry.gather();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    TextEncoder::new().encode(&metric_families, &mut buffer)?;

    debug!(
        families = metric_families.len(),
        bytes = buffer.len(),
        "Rendered exposition text"
    );

    String::from_utf8(buffer).map_err(|_| ExpositionError::EncodingFailed)
}

fn new_family(sample: &Sample) -> Result<FamilyEntry, prometheus::Error> {
    let help = if sample.help.is_empty() {
        sample.name.as_str()
    } else {
        sample.help
    };
    let opts = Opts::new(sample.name.as_str(), help);
    let label_keys: Vec<String> = sample.labels.iter().map(|(k, _)| k.clone()).collect();
    let key_refs: Vec<&str> = label_keys.iter().map(String::as_str).collect();

    let family = match sample.value_type {
        ValueType::Gauge => Family::Gauge(GaugeVec::new(opts, &key_refs)?),
        ValueType::Counter => Family::Counter(CounterVec::new(opts, &key_refs)?),
    };

    Ok(FamilyEntry {
        value_type: sample.value_type,
        label_keys,
        family,
    })
}
