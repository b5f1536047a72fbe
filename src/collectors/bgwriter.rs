use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, Dialect, EngineVersion};
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::{exactly_one, query_span, unix_seconds};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::FromRow;
use tracing::{debug, instrument};
use tracing_futures::Instrument as _;

const BGWRITER_SQL: &str = r"
    SELECT checkpoints_timed::float8, checkpoints_req::float8,
           checkpoint_write_time::float8, checkpoint_sync_time::float8,
           buffers_checkpoint::float8, buffers_clean::float8, maxwritten_clean::float8,
           buffers_backend::float8, buffers_backend_fsync::float8, buffers_alloc::float8,
           stats_reset
    FROM pg_stat_bgwriter
";

// Write/sync timings, backend fsyncs and the reset time are not tracked
// before Greenplum 6.
const BGWRITER_SQL_LEGACY: &str = r"
    SELECT checkpoints_timed::float8, checkpoints_req::float8,
           0::float8 AS checkpoint_write_time, 0::float8 AS checkpoint_sync_time,
           buffers_checkpoint::float8, buffers_clean::float8, maxwritten_clean::float8,
           buffers_backend::float8, 0::float8 AS buffers_backend_fsync, buffers_alloc::float8,
           NULL::timestamptz AS stats_reset
    FROM pg_stat_bgwriter
";

static CHECKPOINTS_TIMED: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_checkpoints_timed_total",
    "Number of scheduled checkpoints that have been performed",
    &[],
);

static CHECKPOINTS_REQ: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_checkpoints_req_total",
    "Number of requested checkpoints that have been performed",
    &[],
);

static CHECKPOINT_WRITE_TIME: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_checkpoint_write_time_seconds_total",
    "Time spent in the portion of checkpoint processing where files are written to disk",
    &[],
);

static CHECKPOINT_SYNC_TIME: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_checkpoint_sync_time_seconds_total",
    "Time spent in the portion of checkpoint processing where files are synchronized to disk",
    &[],
);

static BUFFERS_CHECKPOINT: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_buffers_checkpoint_total",
    "Number of buffers written during checkpoints",
    &[],
);

static BUFFERS_CLEAN: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_buffers_clean_total",
    "Number of buffers written by the background writer",
    &[],
);

static MAXWRITTEN_CLEAN: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_maxwritten_clean_total",
    "Number of times the background writer stopped a cleaning scan because it had written too many buffers",
    &[],
);

static BUFFERS_BACKEND: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_buffers_backend_total",
    "Number of buffers written directly by a backend",
    &[],
);

static BUFFERS_BACKEND_FSYNC: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_buffers_backend_fsync_total",
    "Number of times a backend had to execute its own fsync call",
    &[],
);

static BUFFERS_ALLOC: MetricDesc = MetricDesc::counter(
    "greenplum_server_bgwriter_buffers_alloc_total",
    "Number of buffers allocated",
    &[],
);

static STATS_RESET: MetricDesc = MetricDesc::gauge(
    "greenplum_server_bgwriter_stats_reset_timestamp",
    "Time at which these statistics were last reset",
    &[],
);

/// Checkpoint and background writer activity from `pg_stat_bgwriter`.
#[derive(Clone, Debug, Default)]
pub struct BgwriterScraper;

impl BgwriterScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[must_use]
pub const fn bgwriter_sql(dialect: Dialect) -> &'static str {
    dialect.pick(BGWRITER_SQL_LEGACY, BGWRITER_SQL)
}

#[derive(Debug, FromRow)]
struct Bgwriter {
    checkpoints_timed: f64,
    checkpoints_req: f64,
    // milliseconds
    checkpoint_write_time: f64,
    checkpoint_sync_time: f64,
    buffers_checkpoint: f64,
    buffers_clean: f64,
    maxwritten_clean: f64,
    buffers_backend: f64,
    buffers_backend_fsync: f64,
    buffers_alloc: f64,
    stats_reset: Option<DateTime<Utc>>,
}

impl Bgwriter {
    fn emit(&self, sink: &mut MetricSink) {
        sink.emit(&CHECKPOINTS_TIMED, self.checkpoints_timed, &[]);
        sink.emit(&CHECKPOINTS_REQ, self.checkpoints_req, &[]);
        sink.emit(&CHECKPOINT_WRITE_TIME, self.checkpoint_write_time / 1000.0, &[]);
        sink.emit(&CHECKPOINT_SYNC_TIME, self.checkpoint_sync_time / 1000.0, &[]);
        sink.emit(&BUFFERS_CHECKPOINT, self.buffers_checkpoint, &[]);
        sink.emit(&BUFFERS_CLEAN, self.buffers_clean, &[]);
        sink.emit(&MAXWRITTEN_CLEAN, self.maxwritten_clean, &[]);
        sink.emit(&BUFFERS_BACKEND, self.buffers_backend, &[]);
        sink.emit(&BUFFERS_BACKEND_FSYNC, self.buffers_backend_fsync, &[]);
        sink.emit(&BUFFERS_ALLOC, self.buffers_alloc, &[]);

        if let Some(reset) = self.stats_reset {
            sink.emit(&STATS_RESET, unix_seconds(reset), &[]);
        }
    }
}

impl Scraper for BgwriterScraper {
    fn name(&self) -> &'static str {
        "bgwriter"
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "bgwriter", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let sql = bgwriter_sql(version.dialect());

            let row = sqlx::query_as::<_, Bgwriter>(sql)
                .fetch_optional(conn.pool())
                .instrument(query_span("bgwriter", sql))
                .await?;

            let stats = exactly_one(row, "bgwriter")?;
            debug!(?stats, "bgwriter");
            stats.emit(sink);

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(stats_reset: Option<DateTime<Utc>>) -> Bgwriter {
        Bgwriter {
            checkpoints_timed: 10.0,
            checkpoints_req: 2.0,
            checkpoint_write_time: 2500.0,
            checkpoint_sync_time: 500.0,
            buffers_checkpoint: 100.0,
            buffers_clean: 5.0,
            maxwritten_clean: 0.0,
            buffers_backend: 7.0,
            buffers_backend_fsync: 0.0,
            buffers_alloc: 1000.0,
            stats_reset,
        }
    }

    #[test]
    fn test_bgwriter_scraper_name() {
        let scraper = BgwriterScraper::new();
        assert_eq!(scraper.name(), "bgwriter");
        assert!(!scraper.enabled_by_default());
    }

    #[test]
    fn test_legacy_dialect_fills_missing_columns() {
        let legacy = bgwriter_sql(EngineVersion::new(5).dialect());
        assert!(legacy.contains("0::float8 AS checkpoint_write_time"));
        assert!(legacy.contains("NULL::timestamptz AS stats_reset"));
        assert!(bgwriter_sql(EngineVersion::new(6).dialect()).contains("buffers_backend_fsync::float8"));
    }

    #[test]
    fn test_times_are_converted_to_seconds() {
        let mut sink = MetricSink::new();
        stats(Some(DateTime::<Utc>::UNIX_EPOCH)).emit(&mut sink);

        assert_eq!(sink.len(), 11);
        let write = sink
            .find("greenplum_server_bgwriter_checkpoint_write_time_seconds_total")
            .next();
        assert!(write.is_some_and(|s| (s.value() - 2.5).abs() < f64::EPSILON));
    }

    #[test]
    fn test_missing_reset_time_is_skipped() {
        let mut sink = MetricSink::new();
        stats(None).emit(&mut sink);

        assert_eq!(sink.len(), 10);
        assert_eq!(sink.find("greenplum_server_bgwriter_stats_reset_timestamp").count(), 0);
    }
}
