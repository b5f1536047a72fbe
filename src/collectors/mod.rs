use anyhow::Result;
use futures::future::BoxFuture;

pub mod connection;
pub mod errors;
pub mod meta;
pub mod orchestrator;
pub mod process;
pub mod sample;
pub mod stopwatch;

use connection::{Connection, EngineVersion};
use sample::MetricSink;

#[macro_use]
mod register_macro;

/// One unit of data gathering: a query (or a few) against the cluster whose
/// results are pushed onto the cycle's [`MetricSink`].
pub trait Scraper {
    /// Stable identifier; also the suffix of the `--scraper.<name>` flag.
    fn name(&self) -> &'static str;

    fn enabled_by_default(&self) -> bool;

    /// Run the scraper's queries and emit samples.
    ///
    /// Samples emitted before an error still reach the output; the returned
    /// error is only logged by the orchestrator.
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>>;
}

// Registration order is the order scrapers run in each cycle.
register_scrapers! {
    cluster_state => ClusterStateScraper,
    segment => SegmentScraper,
    database_size => DatabaseSizeScraper,
    locks => LocksScraper,
    connections => ConnectionsScraper,
    max_connections => MaxConnectionsScraper,
    connections_detail => ConnectionsDetailScraper,
    users => UsersScraper,
    bgwriter => BgwriterScraper,
    system => SystemScraper,
    queries => QueriesScraper,
    dynamic_memory => DynamicMemoryScraper,
    diskspace => DiskspaceScraper,
}

// Other modules
pub mod config;
pub mod registry;
pub mod util;
