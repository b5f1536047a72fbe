use crate::collectors::sample::{MetricDesc, MetricSink};
use prometheus::{Gauge, IntCounter};
use std::time::Duration;

static TOTAL_SCRAPED: MetricDesc = MetricDesc::counter(
    "greenplum_exporter_total_scraped",
    "Total number of collection cycles run by the exporter",
    &[],
);

static TOTAL_ERROR: MetricDesc = MetricDesc::counter(
    "greenplum_exporter_total_error",
    "Total number of failed collection cycles",
    &[],
);

static SCRAPE_DURATION: MetricDesc = MetricDesc::gauge(
    "greenplum_exporter_scrape_duration_second",
    "Elapsed time of the last collection cycle in seconds",
    &[],
);

static UP: MetricDesc = MetricDesc::gauge(
    "greenplum_up",
    "Whether the Greenplum cluster was reachable in the last cycle (1 = up, 0 = down)",
    &[],
);

/// Exporter self-metrics, carried across cycles.
///
/// Only the orchestrator mutates these, always while holding the cycle lock.
/// Readers such as the health endpoint see the values of the last finished
/// cycle.
#[derive(Clone, Debug)]
pub struct ExporterMetrics {
    total_scraped: IntCounter,
    total_error: IntCounter,
    scrape_duration: Gauge,
    up: Gauge,
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    /// # Panics
    ///
    /// Panics if metric creation fails (should never happen with valid metric names)
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            total_scraped: IntCounter::new(TOTAL_SCRAPED.name, TOTAL_SCRAPED.help)
                .expect("greenplum_exporter_total_scraped"),
            total_error: IntCounter::new(TOTAL_ERROR.name, TOTAL_ERROR.help)
                .expect("greenplum_exporter_total_error"),
            scrape_duration: Gauge::new(SCRAPE_DURATION.name, SCRAPE_DURATION.help)
                .expect("greenplum_exporter_scrape_duration_second"),
            up: Gauge::new(UP.name, UP.help).expect("greenplum_up"),
        }
    }

    pub fn inc_scraped(&self) {
        self.total_scraped.inc();
    }

    pub fn inc_error(&self) {
        self.total_error.inc();
    }

    pub fn set_duration(&self, elapsed: Duration) {
        self.scrape_duration.set(elapsed.as_secs_f64());
    }

    pub fn set_up(&self, up: bool) {
        self.up.set(if up { 1.0 } else { 0.0 });
    }

    #[must_use]
    pub fn total_scraped(&self) -> u64 {
        self.total_scraped.get()
    }

    #[must_use]
    pub fn total_error(&self) -> u64 {
        self.total_error.get()
    }

    #[must_use]
    pub fn scrape_duration(&self) -> f64 {
        self.scrape_duration.get()
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        self.up.get() > 0.0
    }

    /// Push the current values as four samples.
    #[allow(clippy::cast_precision_loss)]
    pub fn emit(&self, sink: &mut MetricSink) {
        sink.emit(&SCRAPE_DURATION, self.scrape_duration.get(), &[]);
        sink.emit(&UP, self.up.get(), &[]);
        sink.emit(&TOTAL_SCRAPED, self.total_scraped.get() as f64, &[]);
        sink.emit(&TOTAL_ERROR, self.total_error.get() as f64, &[]);
    }
}
