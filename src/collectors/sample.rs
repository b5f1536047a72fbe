//! Metric samples and the per-cycle output stream.
//!
//! Scrapers never touch a `prometheus::Registry` directly. Each one declares
//! its metric identifiers once as `static` [`MetricDesc`] values and pushes
//! immutable [`MetricSample`]s onto the [`MetricSink`] handed to it by the
//! orchestrator. At the end of a cycle the sink is rendered into metric
//! families for the text encoder.

use prometheus::proto::MetricFamily;
use prometheus::core::Collector;
use prometheus::{CounterVec, GaugeVec, Opts, Registry};
use std::collections::HashMap;
use tracing::{error, warn};

/// Common namespace for every metric exported by this crate.
pub const NAMESPACE: &str = "greenplum";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// Identifier, help text, kind and label schema of one metric family.
#[derive(Debug)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

impl MetricDesc {
    #[must_use]
    pub const fn gauge(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
            labels,
        }
    }

    #[must_use]
    pub const fn counter(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Counter,
            labels,
        }
    }
}

/// One observation: a descriptor, a value and the label values in schema order.
#[derive(Clone, Debug)]
pub struct MetricSample {
    desc: &'static MetricDesc,
    value: f64,
    labels: Vec<String>,
}

impl MetricSample {
    #[must_use]
    pub const fn desc(&self) -> &'static MetricDesc {
        self.desc
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    #[must_use]
    pub fn kind(&self) -> MetricKind {
        self.desc.kind
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Value of the label `name`, if the descriptor declares it.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .labels
            .iter()
            .position(|l| *l == name)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}

/// Shared output stream of a collection cycle.
#[derive(Debug, Default)]
pub struct MetricSink {
    samples: Vec<MetricSample>,
}

impl MetricSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a sample. Samples whose label values do not match the
    /// descriptor's schema are dropped and logged.
    pub fn emit(&mut self, desc: &'static MetricDesc, value: f64, labels: &[&str]) {
        if labels.len() != desc.labels.len() {
            error!(
                metric = desc.name,
                expected = desc.labels.len(),
                got = labels.len(),
                "label values do not match metric schema; sample dropped"
            );
            return;
        }

        self.samples.push(MetricSample {
            desc,
            value,
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
        });
    }

    #[must_use]
    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples carrying the identifier `name`.
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MetricSample> + 'a {
        self.samples.iter().filter(move |s| s.name() == name)
    }

    /// Render all samples into metric families, grouped by identifier.
    ///
    /// A family whose descriptor is not a valid prometheus metric, or clashes
    /// with an earlier family of the same name, is logged and left out; the
    /// rest of the snapshot is still returned.
    #[must_use]
    pub fn gather(&self) -> Vec<MetricFamily> {
        let registry = Registry::new();
        let mut gauges: HashMap<&'static str, Option<GaugeVec>> = HashMap::new();
        let mut counters: HashMap<&'static str, Option<CounterVec>> = HashMap::new();

        for sample in &self.samples {
            let desc = sample.desc;
            let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();

            match desc.kind {
                MetricKind::Gauge => {
                    let Some(vec) = family(&mut gauges, &registry, desc, || {
                        GaugeVec::new(Opts::new(desc.name, desc.help), desc.labels)
                    }) else {
                        continue;
                    };

                    match vec.get_metric_with_label_values(&values) {
                        Ok(gauge) => gauge.set(sample.value),
                        Err(e) => warn!(metric = desc.name, error = %e, "skipping sample"),
                    }
                }
                MetricKind::Counter => {
                    let Some(vec) = family(&mut counters, &registry, desc, || {
                        CounterVec::new(Opts::new(desc.name, desc.help), desc.labels)
                    }) else {
                        continue;
                    };

                    match vec.get_metric_with_label_values(&values) {
                        // Counters only move forward; a negative or NaN reading is clamped.
                        Ok(counter) => counter.inc_by(sample.value.max(0.0)),
                        Err(e) => warn!(metric = desc.name, error = %e, "skipping sample"),
                    }
                }
            }
        }

        registry.gather()
    }
}

/// Family for `desc`, built and registered on first use. A family that
/// cannot be built or registered is remembered as `None` and logged once.
fn family<'a, T>(
    families: &'a mut HashMap<&'static str, Option<T>>,
    registry: &Registry,
    desc: &'static MetricDesc,
    build: impl FnOnce() -> prometheus::Result<T>,
) -> Option<&'a T>
where
    T: Collector + Clone + 'static,
{
    families
        .entry(desc.name)
        .or_insert_with(|| {
            let registered = build().and_then(|vec| {
                registry.register(Box::new(vec.clone()))?;
                Ok(vec)
            });

            match registered {
                Ok(vec) => Some(vec),
                Err(e) => {
                    error!(metric = desc.name, error = %e, "metric family dropped");
                    None
                }
            }
        })
        .as_ref()
}
