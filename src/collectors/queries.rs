use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, EngineVersion};
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::{exactly_one, fetch_gpperfmon};
use anyhow::Result;
use futures::future::BoxFuture;
use sqlx::FromRow;
use tracing::{debug, instrument};

const QUERIES_SQL: &str = r"
    SELECT queries_total::float8, queries_running::float8, queries_queued::float8
    FROM database_now
";

static TOTAL_QUERIES: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_total_queries",
    "Total number of queries in the Greenplum cluster",
    &[],
);

static RUNNING_QUERIES: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_running_queries",
    "Number of running queries in the Greenplum cluster",
    &[],
);

static QUEUED_QUERIES: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_queued_queries",
    "Number of queued queries in the Greenplum cluster",
    &[],
);

#[derive(Clone, Debug, Default)]
pub struct QueriesScraper;

impl QueriesScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[derive(Debug, FromRow)]
struct QueryCounts {
    queries_total: Option<f64>,
    queries_running: Option<f64>,
    queries_queued: Option<f64>,
}

impl QueryCounts {
    fn emit(&self, sink: &mut MetricSink) {
        sink.emit(&TOTAL_QUERIES, self.queries_total.unwrap_or_default(), &[]);
        sink.emit(&RUNNING_QUERIES, self.queries_running.unwrap_or_default(), &[]);
        sink.emit(&QUEUED_QUERIES, self.queries_queued.unwrap_or_default(), &[]);
    }
}

impl Scraper for QueriesScraper {
    fn name(&self) -> &'static str {
        "queries"
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "queries", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        _version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let rows = fetch_gpperfmon(conn, "queries", QUERIES_SQL).await?;

            let counts = exactly_one(
                rows.first().map(QueryCounts::from_row).transpose()?,
                "queries info",
            )?;
            debug!(?counts, "queries");
            counts.emit(sink);

            Ok(())
        })
    }
}
