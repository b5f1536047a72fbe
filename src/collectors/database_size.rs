use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, EngineVersion};
use crate::collectors::errors::{ScrapeErrors, decode_rows};
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::{LONG_DEADLINE, query_span, with_deadline};
use anyhow::{Context, Error, Result};
use futures::future::BoxFuture;
use sqlx::{Connection as _, FromRow, PgPool};
use tracing::{debug, instrument};
use tracing_futures::Instrument as _;

const DATABASE_SIZE_SQL: &str = r"
    SELECT sodddatname::text AS dbname, (sodddatsize / (1024 * 1024))::float8 AS size_mb
    FROM gp_toolkit.gp_size_of_database
";

const TABLE_COUNT_SQL: &str = r"
    SELECT count(*)::float8
    FROM information_schema.tables
    WHERE table_schema NOT IN ('gp_toolkit', 'information_schema', 'pg_catalog')
";

const HIT_CACHE_RATE_SQL: &str = r"
    SELECT (sum(blks_hit) / nullif(sum(blks_read) + sum(blks_hit), 0) * 100)::float8
    FROM pg_stat_database
";

const TX_COMMIT_RATE_SQL: &str = r"
    SELECT (sum(xact_commit) / nullif(sum(xact_commit) + sum(xact_rollback), 0) * 100)::float8
    FROM pg_stat_database
";

static DATABASE_SIZE: MetricDesc = MetricDesc::gauge(
    "greenplum_node_database_name_mb_size",
    "Total MB size of each database in the file system",
    &["dbname"],
);

static TABLE_COUNT: MetricDesc = MetricDesc::gauge(
    "greenplum_node_database_table_total_count",
    "Total user table count of each database",
    &["dbname"],
);

static HIT_CACHE_RATE: MetricDesc = MetricDesc::gauge(
    "greenplum_server_database_hit_cache_percent_rate",
    "Cache hit percent rate over all databases",
    &[],
);

static TX_COMMIT_RATE: MetricDesc = MetricDesc::gauge(
    "greenplum_server_database_transition_commit_percent_rate",
    "Transaction commit percent rate over all databases",
    &[],
);

/// Size and table count of every database, cluster-wide cache hit and
/// commit rates.
///
/// Table counts need one short-lived connection per database; a database
/// that cannot be reached only loses its own count.
#[derive(Clone, Debug, Default)]
pub struct DatabaseSizeScraper;

impl DatabaseSizeScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[derive(Debug, FromRow)]
struct DatabaseSize {
    dbname: String,
    size_mb: f64,
}

async fn scrape_sizes(pool: &PgPool, sink: &mut MetricSink, errors: &mut ScrapeErrors) -> Vec<String> {
    let rows = match with_deadline(
        LONG_DEADLINE,
        "database size",
        sqlx::query(DATABASE_SIZE_SQL)
            .fetch_all(pool)
            .instrument(query_span("database_size", DATABASE_SIZE_SQL)),
    )
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            errors.push(e);
            return Vec::new();
        }
    };

    let mut names = Vec::with_capacity(rows.len());

    errors.extend(
        decode_rows(
            &rows,
            |row| DatabaseSize::from_row(row).map_err(Error::from),
            |db| {
                sink.emit(&DATABASE_SIZE, db.size_mb, &[db.dbname.as_str()]);
                names.push(db.dbname);
            },
        )
        .into_result()
        .err(),
    );

    names
}

async fn count_tables(conn: &Connection, dbname: &str) -> Result<f64> {
    let mut aux = conn.open_auxiliary(dbname).await?;

    let count = with_deadline(
        LONG_DEADLINE,
        "table count",
        sqlx::query_scalar::<_, f64>(TABLE_COUNT_SQL)
            .fetch_one(&mut aux)
            .instrument(query_span("database_size", TABLE_COUNT_SQL)),
    )
    .await;

    if let Err(e) = aux.close().await {
        debug!(dbname, error = %e, "closing auxiliary connection");
    }

    count.with_context(|| format!("counting tables of {dbname}"))
}

async fn scrape_rate(
    pool: &PgPool,
    sql: &'static str,
    desc: &'static MetricDesc,
    sink: &mut MetricSink,
) -> Result<()> {
    let rate = sqlx::query_scalar::<_, Option<f64>>(sql)
        .fetch_one(pool)
        .instrument(query_span("database_size", sql))
        .await?;

    // NULL when pg_stat_database has no activity yet.
    if let Some(rate) = rate {
        sink.emit(desc, rate, &[]);
    }

    Ok(())
}

impl Scraper for DatabaseSizeScraper {
    fn name(&self) -> &'static str {
        "database_size"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "database_size", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        _version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut errors = ScrapeErrors::new();

            let names = scrape_sizes(conn.pool(), sink, &mut errors).await;

            for dbname in &names {
                if let Some(count) = errors.record(count_tables(conn, dbname).await) {
                    sink.emit(&TABLE_COUNT, count, &[dbname.as_str()]);
                }
            }

            errors.record(scrape_rate(conn.pool(), HIT_CACHE_RATE_SQL, &HIT_CACHE_RATE, sink).await);
            errors.record(scrape_rate(conn.pool(), TX_COMMIT_RATE_SQL, &TX_COMMIT_RATE, sink).await);

            debug!(databases = names.len(), errors = errors.len(), "database size");

            errors.into_result()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_database_size_scraper_name() {
        let scraper = DatabaseSizeScraper::new();
        assert_eq!(scraper.name(), "database_size");
        assert!(scraper.enabled_by_default());
    }

    #[test]
    fn test_rates_guard_against_division_by_zero() {
        assert!(HIT_CACHE_RATE_SQL.contains("nullif"));
        assert!(TX_COMMIT_RATE_SQL.contains("nullif"));
    }

    #[tokio::test]
    async fn test_unreachable_database_fails_only_its_count() {
        use sqlx::postgres::PgConnectOptions;
        use std::str::FromStr;

        let opts = PgConnectOptions::from_str("postgresql://gpadmin@127.0.0.1:1/postgres").unwrap();
        let conn = Connection::new_lazy(opts);

        let err = count_tables(&conn, "sales").await;
        assert!(err.is_err());
        assert!(format!("{:#}", err.unwrap_err()).contains("sales"));
    }
}
