use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, Dialect, EngineVersion};
use crate::collectors::errors::{ScrapeErrors, decode_rows};
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::query_span;
use anyhow::{Error, Result};
use futures::future::BoxFuture;
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use tracing_futures::Instrument as _;

const BY_USER_SQL: &str = r"
    SELECT usename::text AS key,
           count(*)::float8 AS total,
           sum(CASE WHEN state = 'idle' THEN 1 ELSE 0 END)::float8 AS idle,
           sum(CASE WHEN state <> 'idle' THEN 1 ELSE 0 END)::float8 AS active
    FROM pg_stat_activity
    GROUP BY 1
";

const BY_USER_SQL_LEGACY: &str = r"
    SELECT usename::text AS key,
           count(*)::float8 AS total,
           sum(CASE WHEN current_query = '<IDLE>' THEN 1 ELSE 0 END)::float8 AS idle,
           sum(CASE WHEN current_query <> '<IDLE>' THEN 1 ELSE 0 END)::float8 AS active
    FROM pg_stat_activity
    GROUP BY 1
";

const BY_CLIENT_SQL: &str = r"
    SELECT client_addr::text AS key,
           count(*)::float8 AS total,
           sum(CASE WHEN state = 'idle' THEN 1 ELSE 0 END)::float8 AS idle,
           sum(CASE WHEN state <> 'idle' THEN 1 ELSE 0 END)::float8 AS active
    FROM pg_stat_activity
    WHERE pid <> pg_backend_pid()
    GROUP BY 1
";

const BY_CLIENT_SQL_LEGACY: &str = r"
    SELECT client_addr::text AS key,
           count(*)::float8 AS total,
           sum(CASE WHEN current_query = '<IDLE>' THEN 1 ELSE 0 END)::float8 AS idle,
           sum(CASE WHEN current_query <> '<IDLE>' THEN 1 ELSE 0 END)::float8 AS active
    FROM pg_stat_activity
    WHERE procpid <> pg_backend_pid()
    GROUP BY 1
";

static TOTAL_PER_USER: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_total_connections_per_user",
    "Total connections of the database user",
    &["usename"],
);

static IDLE_PER_USER: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_idle_connections_per_user",
    "Idle connections of the database user",
    &["usename"],
);

static ACTIVE_PER_USER: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_active_connections_per_user",
    "Active connections of the database user",
    &["usename"],
);

static ONLINE_USERS: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_total_online_user_count",
    "Number of distinct users with at least one connection",
    &[],
);

static TOTAL_PER_CLIENT: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_total_connections_per_client",
    "Total connections from the client address",
    &["client"],
);

static IDLE_PER_CLIENT: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_idle_connections_per_client",
    "Idle connections from the client address",
    &["client"],
);

static ACTIVE_PER_CLIENT: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_active_connections_per_client",
    "Active connections from the client address",
    &["client"],
);

static CLIENTS: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_total_client_count",
    "Number of distinct client addresses with at least one connection",
    &[],
);

/// The three per-key families plus the key count for one grouping.
struct Grouping {
    what: &'static str,
    total: &'static MetricDesc,
    idle: &'static MetricDesc,
    active: &'static MetricDesc,
    count: &'static MetricDesc,
}

static BY_USER: Grouping = Grouping {
    what: "connections by user",
    total: &TOTAL_PER_USER,
    idle: &IDLE_PER_USER,
    active: &ACTIVE_PER_USER,
    count: &ONLINE_USERS,
};

static BY_CLIENT: Grouping = Grouping {
    what: "connections by client",
    total: &TOTAL_PER_CLIENT,
    idle: &IDLE_PER_CLIENT,
    active: &ACTIVE_PER_CLIENT,
    count: &CLIENTS,
};

/// Connection load per user and per client address.
#[derive(Clone, Debug, Default)]
pub struct ConnectionsDetailScraper;

impl ConnectionsDetailScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[must_use]
pub const fn by_user_sql(dialect: Dialect) -> &'static str {
    dialect.pick(BY_USER_SQL_LEGACY, BY_USER_SQL)
}

#[must_use]
pub const fn by_client_sql(dialect: Dialect) -> &'static str {
    dialect.pick(BY_CLIENT_SQL_LEGACY, BY_CLIENT_SQL)
}

#[derive(Debug, FromRow)]
struct Load {
    // NULL for local socket connections and background workers.
    key: Option<String>,
    total: f64,
    idle: Option<f64>,
    active: Option<f64>,
}

#[allow(clippy::cast_precision_loss)]
fn emit_loads<I>(grouping: &Grouping, loads: I, sink: &mut MetricSink)
where
    I: IntoIterator<Item = Load>,
{
    let mut keys = 0_usize;

    for load in loads {
        let key = load.key.as_deref().unwrap_or_default();
        sink.emit(grouping.total, load.total, &[key]);
        sink.emit(grouping.idle, load.idle.unwrap_or_default(), &[key]);
        sink.emit(grouping.active, load.active.unwrap_or_default(), &[key]);
        keys += 1;
    }

    sink.emit(grouping.count, keys as f64, &[]);
}

async fn scrape_grouping(
    pool: &PgPool,
    sql: &'static str,
    grouping: &Grouping,
    sink: &mut MetricSink,
) -> Result<()> {
    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .instrument(query_span("connections_detail", sql))
        .await
        .map_err(|e| Error::from(e).context(grouping.what))?;

    let mut loads = Vec::with_capacity(rows.len());
    let errors = decode_rows(
        &rows,
        |row| Load::from_row(row).map_err(Error::from),
        |load| loads.push(load),
    );

    emit_loads(grouping, loads, sink);

    errors.into_result()
}

impl Scraper for ConnectionsDetailScraper {
    fn name(&self) -> &'static str {
        "connections_detail"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "connections_detail", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dialect = version.dialect();
            let mut errors = ScrapeErrors::new();

            errors.record(scrape_grouping(conn.pool(), by_user_sql(dialect), &BY_USER, sink).await);
            errors.record(
                scrape_grouping(conn.pool(), by_client_sql(dialect), &BY_CLIENT, sink).await,
            );

            errors.into_result()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(key: Option<&str>, total: f64) -> Load {
        Load {
            key: key.map(ToString::to_string),
            total,
            idle: Some(0.0),
            active: None,
        }
    }

    #[test]
    fn test_connections_detail_scraper_name() {
        let scraper = ConnectionsDetailScraper::new();
        assert_eq!(scraper.name(), "connections_detail");
        assert!(scraper.enabled_by_default());
    }

    #[test]
    fn test_dialects() {
        assert!(by_user_sql(Dialect::Legacy).contains("current_query"));
        assert!(by_user_sql(Dialect::Current).contains("state"));
        assert!(by_client_sql(Dialect::Legacy).contains("procpid"));
        assert!(by_client_sql(Dialect::Current).contains("WHERE pid"));
    }

    #[test]
    fn test_count_matches_emitted_keys() {
        let mut sink = MetricSink::new();
        emit_loads(
            &BY_CLIENT,
            vec![load(Some("10.0.0.1"), 3.0), load(None, 1.0)],
            &mut sink,
        );

        assert_eq!(sink.find("greenplum_cluster_total_connections_per_client").count(), 2);
        let count = sink.find("greenplum_cluster_total_client_count").next();
        assert!(count.is_some_and(|s| (s.value() - 2.0).abs() < f64::EPSILON));
        assert!(sink
            .find("greenplum_cluster_total_connections_per_client")
            .any(|s| s.label("client") == Some("")));
    }

    #[test]
    fn test_empty_grouping_still_reports_zero_count() {
        let mut sink = MetricSink::new();
        emit_loads(&BY_USER, Vec::new(), &mut sink);

        assert_eq!(sink.len(), 1);
        assert!(sink.find("greenplum_cluster_total_online_user_count").next().is_some());
    }
}
