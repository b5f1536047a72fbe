//! Collection cycles.
//!
//! A cycle checks the connection, runs every enabled scraper in registration
//! order and appends the exporter meta-metrics. Cycles never overlap: the
//! connector lives behind an async mutex and a poll that arrives mid-cycle
//! waits for the lock.

use crate::collectors::connection::Connector;
use crate::collectors::meta::ExporterMetrics;
use crate::collectors::registry::{DynScraper, ScraperRegistry};
use crate::collectors::sample::MetricSink;
use crate::collectors::stopwatch::Stopwatch;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, instrument, warn};
use tracing_futures::Instrument as _;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    /// Connected, but the named scrapers returned errors.
    PartialFailure { failed: Vec<&'static str> },
    /// The connection could not be established; no scraper ran.
    HardFailure,
}

/// Result of one cycle: its outcome and every sample it produced.
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub elapsed: Duration,
    pub sink: MetricSink,
}

pub struct Orchestrator<C> {
    connector: Mutex<C>,
    scrapers: Vec<DynScraper>,
    metrics: ExporterMetrics,
}

impl<C: Connector> Orchestrator<C> {
    #[must_use]
    pub fn new(connector: C, registry: &ScraperRegistry) -> Self {
        Self {
            connector: Mutex::new(connector),
            scrapers: registry.scrapers().to_vec(),
            metrics: ExporterMetrics::new(),
        }
    }

    /// Meta-metrics; clones share state with the orchestrator.
    #[must_use]
    pub const fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn scraper_names(&self) -> Vec<&'static str> {
        self.scrapers.iter().map(|s| s.name()).collect()
    }

    /// Run one collection cycle.
    ///
    /// Scraper errors are logged and reflected in the outcome, never
    /// returned: the caller always gets a best-effort snapshot.
    #[instrument(skip(self), level = "info", fields(otel.kind = "internal"))]
    pub async fn collect(&self) -> CycleReport {
        let mut connector = self.connector.lock().await;

        let start = Instant::now();
        let mut watch = Stopwatch::new("scrape");
        let mut sink = MetricSink::new();

        self.metrics.inc_scraped();

        time_task(&mut watch, "check connections");
        let connected = connector.ensure_connected().await;
        stop_task(&mut watch);

        let (conn, version) = match connected {
            Ok(connected) => connected,
            Err(e) => {
                let elapsed = start.elapsed();

                self.metrics.inc_error();
                self.metrics.set_duration(elapsed);
                self.metrics.set_up(false);

                error!(error = %format!("{e:#}"), "check database connection failed");

                self.metrics.emit(&mut sink);

                return CycleReport {
                    outcome: CycleOutcome::HardFailure,
                    elapsed,
                    sink,
                };
            }
        };

        info!(version = %version, "check connections ok");
        self.metrics.set_up(true);

        let mut failed = Vec::new();

        for scraper in &self.scrapers {
            let name = scraper.name();
            let span = info_span!("scraper.scrape", scraper = name, otel.kind = "internal");

            time_task(&mut watch, format!("scraping: {name}"));
            let res = scraper.scrape(conn, version, &mut sink).instrument(span).await;
            stop_task(&mut watch);

            match res {
                Ok(()) => debug!(scraper = name, "scraper finished"),
                Err(e) => {
                    warn!(scraper = name, error = %format!("{e:#}"), "scraper failed");
                    failed.push(name);
                }
            }
        }

        let elapsed = start.elapsed();
        self.metrics.set_duration(elapsed);

        info!(
            samples = sink.len(),
            failed = failed.len(),
            "scrape finished, detail elapsed:\n{}",
            watch.pretty_print()
        );

        self.metrics.emit(&mut sink);

        let outcome = if failed.is_empty() {
            CycleOutcome::Success
        } else {
            CycleOutcome::PartialFailure { failed }
        };

        CycleReport {
            outcome,
            elapsed,
            sink,
        }
    }

    /// Close the held connection, waiting for any running cycle first.
    pub async fn shutdown(&self) {
        self.connector.lock().await.disconnect().await;
    }
}

fn time_task(watch: &mut Stopwatch, task: impl Into<String>) {
    if let Err(e) = watch.start(task) {
        debug!(error = %e, "stopwatch");
    }
}

fn stop_task(watch: &mut Stopwatch) {
    if let Err(e) = watch.stop() {
        debug!(error = %e, "stopwatch");
    }
}
