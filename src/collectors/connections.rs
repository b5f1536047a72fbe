use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, Dialect, EngineVersion};
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::{exactly_one, query_span};
use anyhow::Result;
use futures::future::BoxFuture;
use sqlx::FromRow;
use tracing::{debug, instrument};
use tracing_futures::Instrument as _;

const CONNECTIONS_SQL: &str = r"
    SELECT count(*)::float8 AS total,
           sum(CASE WHEN state = 'idle' THEN 1 ELSE 0 END)::float8 AS idle,
           sum(CASE WHEN state <> 'idle' THEN 1 ELSE 0 END)::float8 AS active,
           sum(CASE WHEN state <> 'idle' AND NOT waiting THEN 1 ELSE 0 END)::float8 AS running,
           sum(CASE WHEN state <> 'idle' AND waiting THEN 1 ELSE 0 END)::float8 AS waiting
    FROM pg_stat_activity
    WHERE pid <> pg_backend_pid()
";

const CONNECTIONS_SQL_LEGACY: &str = r"
    SELECT count(*)::float8 AS total,
           sum(CASE WHEN current_query = '<IDLE>' THEN 1 ELSE 0 END)::float8 AS idle,
           sum(CASE WHEN current_query <> '<IDLE>' THEN 1 ELSE 0 END)::float8 AS active,
           sum(CASE WHEN current_query <> '<IDLE>' AND NOT waiting THEN 1 ELSE 0 END)::float8 AS running,
           sum(CASE WHEN current_query <> '<IDLE>' AND waiting THEN 1 ELSE 0 END)::float8 AS waiting
    FROM pg_stat_activity
    WHERE procpid <> pg_backend_pid()
";

static TOTAL: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_total_connections",
    "Current connections of the Greenplum cluster at scrape time",
    &[],
);

static IDLE: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_idle_connections",
    "Idle connections of the Greenplum cluster at scrape time",
    &[],
);

static ACTIVE: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_active_connections",
    "Active connections of the Greenplum cluster at scrape time",
    &[],
);

static RUNNING: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_running_connections",
    "Running statements of the Greenplum cluster at scrape time",
    &[],
);

static WAITING: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_waiting_connections",
    "Waiting statements of the Greenplum cluster at scrape time",
    &[],
);

/// Cluster-wide connection totals from `pg_stat_activity`.
#[derive(Clone, Debug, Default)]
pub struct ConnectionsScraper;

impl ConnectionsScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[must_use]
pub const fn connections_sql(dialect: Dialect) -> &'static str {
    dialect.pick(CONNECTIONS_SQL_LEGACY, CONNECTIONS_SQL)
}

#[derive(Debug, FromRow)]
struct Connections {
    total: f64,
    idle: Option<f64>,
    active: Option<f64>,
    running: Option<f64>,
    waiting: Option<f64>,
}

impl Connections {
    // sum() over zero rows is NULL.
    fn emit(&self, sink: &mut MetricSink) {
        sink.emit(&TOTAL, self.total, &[]);
        sink.emit(&IDLE, self.idle.unwrap_or_default(), &[]);
        sink.emit(&ACTIVE, self.active.unwrap_or_default(), &[]);
        sink.emit(&RUNNING, self.running.unwrap_or_default(), &[]);
        sink.emit(&WAITING, self.waiting.unwrap_or_default(), &[]);
    }
}

impl Scraper for ConnectionsScraper {
    fn name(&self) -> &'static str {
        "connections"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "connections", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let sql = connections_sql(version.dialect());

            let row = sqlx::query_as::<_, Connections>(sql)
                .fetch_optional(conn.pool())
                .instrument(query_span("connections", sql))
                .await?;

            let connections = exactly_one(row, "connections")?;
            debug!(?connections, "connections");
            connections.emit(sink);

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connections_scraper_name() {
        let scraper = ConnectionsScraper::new();
        assert_eq!(scraper.name(), "connections");
        assert!(scraper.enabled_by_default());
    }

    #[test]
    fn test_dialects() {
        assert!(connections_sql(Dialect::Legacy).contains("'<IDLE>'"));
        assert!(connections_sql(Dialect::Current).contains("state = 'idle'"));
    }

    #[test]
    fn test_null_sums_become_zero() {
        let mut sink = MetricSink::new();
        Connections {
            total: 0.0,
            idle: None,
            active: None,
            running: None,
            waiting: None,
        }
        .emit(&mut sink);

        assert_eq!(sink.len(), 5);
        assert!(sink.samples().iter().all(|s| s.value().abs() < f64::EPSILON));
    }
}
