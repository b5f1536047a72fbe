use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, Dialect, EngineVersion};
use crate::collectors::errors::decode_rows;
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::{query_span, unix_seconds};
use anyhow::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::FromRow;
use tracing::{debug, instrument};
use tracing_futures::Instrument as _;

const LOCKS_SQL: &str = r"
    SELECT pg_locks.pid::text AS pid,
           pg_database.datname::text AS datname,
           pg_stat_activity.usename::text AS usename,
           pg_locks.locktype::text AS locktype,
           pg_locks.mode::text AS mode,
           pg_stat_activity.application_name::text AS application_name,
           pg_stat_activity.state::text AS state,
           CASE WHEN pg_locks.granted THEN 'get_lock' ELSE 'wait_lock' END AS lock_status,
           pg_stat_activity.query::text AS query,
           least(pg_stat_activity.query_start, pg_stat_activity.xact_start) AS start_time,
           count(*)::float8 AS count
    FROM pg_locks
    JOIN pg_database ON pg_locks.database = pg_database.oid
    JOIN pg_stat_activity ON pg_locks.pid = pg_stat_activity.pid
    WHERE pg_locks.pid <> pg_backend_pid()
      AND pg_stat_activity.application_name <> 'pg_statsinfod'
    GROUP BY 1, 2, 3, 4, 5, 6, 7, 8, 9, 10
    ORDER BY start_time
";

// Before Greenplum 6 the backend pid is `procpid`, the statement is
// `current_query` and there is no `state` column.
const LOCKS_SQL_LEGACY: &str = r"
    SELECT pg_locks.pid::text AS pid,
           pg_database.datname::text AS datname,
           pg_stat_activity.usename::text AS usename,
           pg_locks.locktype::text AS locktype,
           pg_locks.mode::text AS mode,
           pg_stat_activity.application_name::text AS application_name,
           'unknown'::text AS state,
           CASE WHEN pg_locks.granted THEN 'get_lock' ELSE 'wait_lock' END AS lock_status,
           pg_stat_activity.current_query::text AS query,
           least(pg_stat_activity.query_start, pg_stat_activity.xact_start) AS start_time,
           count(*)::float8 AS count
    FROM pg_locks
    JOIN pg_database ON pg_locks.database = pg_database.oid
    JOIN pg_stat_activity ON pg_locks.pid = pg_stat_activity.procpid
    WHERE pg_locks.pid <> pg_backend_pid()
      AND pg_stat_activity.application_name <> 'pg_statsinfod'
    GROUP BY 1, 2, 3, 4, 5, 6, 7, 8, 9, 10
    ORDER BY start_time
";

// `lock_satus` is the label name existing dashboards query.
static LOCKS: MetricDesc = MetricDesc::gauge(
    "greenplum_server_locks_table_detail",
    "Table locks held or awaited, valued with the start time of the holding statement",
    &[
        "pid",
        "datname",
        "usename",
        "locktype",
        "mode",
        "application_name",
        "state",
        "lock_satus",
        "query",
    ],
);

/// One sample per locking backend and lock mode.
#[derive(Clone, Debug, Default)]
pub struct LocksScraper;

impl LocksScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[must_use]
pub const fn locks_sql(dialect: Dialect) -> &'static str {
    dialect.pick(LOCKS_SQL_LEGACY, LOCKS_SQL)
}

#[derive(Debug, FromRow)]
struct Lock {
    pid: String,
    datname: String,
    usename: Option<String>,
    locktype: String,
    mode: Option<String>,
    application_name: Option<String>,
    state: Option<String>,
    lock_status: String,
    query: Option<String>,
    start_time: Option<DateTime<Utc>>,
}

impl Lock {
    fn emit(&self, sink: &mut MetricSink) {
        sink.emit(
            &LOCKS,
            self.start_time.map_or(0.0, unix_seconds),
            &[
                self.pid.as_str(),
                self.datname.as_str(),
                self.usename.as_deref().unwrap_or_default(),
                self.locktype.as_str(),
                self.mode.as_deref().unwrap_or_default(),
                self.application_name.as_deref().unwrap_or_default(),
                self.state.as_deref().unwrap_or_default(),
                self.lock_status.as_str(),
                self.query.as_deref().unwrap_or_default(),
            ],
        );
    }
}

impl Scraper for LocksScraper {
    fn name(&self) -> &'static str {
        "locks"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "locks", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let sql = locks_sql(version.dialect());

            let rows = sqlx::query(sql)
                .fetch_all(conn.pool())
                .instrument(query_span("locks", sql))
                .await?;

            debug!(locks = rows.len(), "locks");

            decode_rows(
                &rows,
                |row| Lock::from_row(row).map_err(Error::from),
                |lock| lock.emit(sink),
            )
            .into_result()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(pid: &str, start_time: Option<DateTime<Utc>>) -> Lock {
        Lock {
            pid: pid.to_string(),
            datname: "sales".to_string(),
            usename: Some("etl".to_string()),
            locktype: "relation".to_string(),
            mode: Some("AccessShareLock".to_string()),
            application_name: None,
            state: None,
            lock_status: "get_lock".to_string(),
            query: Some("select 1".to_string()),
            start_time,
        }
    }

    #[test]
    fn test_locks_scraper_name() {
        let scraper = LocksScraper::new();
        assert_eq!(scraper.name(), "locks");
        assert!(scraper.enabled_by_default());
    }

    #[test]
    fn test_dialect_selects_activity_columns() {
        let legacy = locks_sql(EngineVersion::new(5).dialect());
        let current = locks_sql(EngineVersion::new(6).dialect());

        assert!(legacy.contains("procpid"));
        assert!(legacy.contains("current_query"));
        assert!(!current.contains("procpid"));
        assert!(current.contains("pg_stat_activity.state"));
    }

    #[test]
    fn test_lock_value_is_start_time() {
        let mut sink = MetricSink::new();
        lock("42", Some(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(90))).emit(&mut sink);
        lock("43", None).emit(&mut sink);

        let samples = sink.samples();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().any(|s| s.label("pid") == Some("42") && (s.value() - 90.0).abs() < f64::EPSILON));
        assert!(samples.iter().any(|s| s.label("pid") == Some("43") && s.value().abs() < f64::EPSILON));
        assert!(samples.iter().all(|s| s.label("state") == Some("")));
    }
}
