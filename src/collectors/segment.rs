use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, Dialect, EngineVersion};
use crate::collectors::errors::{ScrapeErrors, decode_rows};
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::{LONG_DEADLINE, SHORT_DEADLINE, query_span, with_deadline};
use anyhow::{Error, Result};
use futures::future::BoxFuture;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};
use tracing_futures::Instrument as _;

// Every column is read as text; role, mode and status are "char" in the catalog.
const SEGMENT_CONFIG_SQL: &str = r"
    SELECT dbid::text, content::text, role::text, preferred_role::text, mode::text,
           status::text, port::text, hostname::text, address::text, datadir::text
    FROM gp_segment_configuration
";

const SEGMENT_CONFIG_SQL_LEGACY: &str = r"
    SELECT dbid::text, content::text, role::text, preferred_role::text, mode::text,
           status::text, port::text, hostname::text, address::text, NULL::text AS datadir
    FROM gp_segment_configuration
";

const DISK_FREE_SQL: &str = r"
    SELECT dfhostname::text AS hostname, (min(dfspace) / (1024 * 1024))::float8 AS free_gb
    FROM gp_toolkit.gp_disk_free
    GROUP BY dfhostname
";

const SEGMENT_LABELS: &[&str] = &[
    "hostname",
    "address",
    "dbid",
    "content",
    "preferred_role",
    "port",
    "data_dir",
];

static STATUS: MetricDesc = MetricDesc::gauge(
    "greenplum_node_segment_status",
    "UP(1) if the segment is running, DOWN(0) if the segment has failed or is unreachable",
    SEGMENT_LABELS,
);

static ROLE: MetricDesc = MetricDesc::gauge(
    "greenplum_node_segment_role",
    "The segment's current role, either primary(1) or mirror(2)",
    SEGMENT_LABELS,
);

static MODE: MetricDesc = MetricDesc::gauge(
    "greenplum_node_segment_mode",
    "The replication status of the segment: synchronized(1), resyncing(2), change logging(3), not synchronized(4)",
    SEGMENT_LABELS,
);

static DISK_FREE: MetricDesc = MetricDesc::gauge(
    "greenplum_node_segment_disk_free_gb_size",
    "Free disk space in GB of the file system of each segment host",
    &["hostname"],
);

/// Segment configuration (status, role, mode) and free disk per host.
#[derive(Clone, Debug, Default)]
pub struct SegmentScraper;

impl SegmentScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[must_use]
pub const fn segment_config_sql(dialect: Dialect) -> &'static str {
    dialect.pick(SEGMENT_CONFIG_SQL_LEGACY, SEGMENT_CONFIG_SQL)
}

/// `u` = 1, `d` = 0; anything else is treated as down.
#[must_use]
pub fn segment_status(status: &str) -> f64 {
    match status.to_ascii_lowercase().as_str() {
        "u" => 1.0,
        _ => 0.0,
    }
}

/// `p` = 1, `m` = 2; anything else is treated as a mirror.
#[must_use]
pub fn segment_role(role: &str) -> f64 {
    match role.to_ascii_lowercase().as_str() {
        "p" => 1.0,
        _ => 2.0,
    }
}

/// `s` = 1, `r` = 2, `c` = 3, `n` = 4; anything else is not synchronized.
#[must_use]
pub fn segment_mode(mode: &str) -> f64 {
    match mode.to_ascii_lowercase().as_str() {
        "s" => 1.0,
        "r" => 2.0,
        "c" => 3.0,
        _ => 4.0,
    }
}

#[derive(Debug, FromRow)]
struct SegmentConfig {
    dbid: String,
    content: String,
    role: String,
    preferred_role: String,
    mode: String,
    status: String,
    port: String,
    hostname: String,
    address: String,
    datadir: Option<String>,
}

impl SegmentConfig {
    fn emit(&self, sink: &mut MetricSink) {
        let labels = [
            self.hostname.as_str(),
            self.address.as_str(),
            self.dbid.as_str(),
            self.content.as_str(),
            self.preferred_role.as_str(),
            self.port.as_str(),
            self.datadir.as_deref().unwrap_or_default(),
        ];

        sink.emit(&STATUS, segment_status(&self.status), &labels);
        sink.emit(&ROLE, segment_role(&self.role), &labels);
        sink.emit(&MODE, segment_mode(&self.mode), &labels);
    }
}

#[derive(Debug, FromRow)]
struct DiskFree {
    hostname: String,
    free_gb: f64,
}

async fn scrape_segment_config(
    pool: &PgPool,
    dialect: Dialect,
    sink: &mut MetricSink,
) -> Result<()> {
    let sql = segment_config_sql(dialect);

    let rows = with_deadline(
        SHORT_DEADLINE,
        "segment configuration",
        sqlx::query(sql)
            .fetch_all(pool)
            .instrument(query_span("segment", sql)),
    )
    .await?;

    debug!(segments = rows.len(), "segment configuration");

    decode_rows(
        &rows,
        |row| SegmentConfig::from_row(row).map_err(Error::from),
        |segment| segment.emit(sink),
    )
    .into_result()
}

async fn scrape_disk_free(pool: &PgPool, sink: &mut MetricSink) -> Result<()> {
    let rows = with_deadline(
        LONG_DEADLINE,
        "segment disk free",
        sqlx::query(DISK_FREE_SQL)
            .fetch_all(pool)
            .instrument(query_span("segment", DISK_FREE_SQL)),
    )
    .await?;

    decode_rows(
        &rows,
        |row| DiskFree::from_row(row).map_err(Error::from),
        |disk| sink.emit(&DISK_FREE, disk.free_gb, &[disk.hostname.trim()]),
    )
    .into_result()
}

impl Scraper for SegmentScraper {
    fn name(&self) -> &'static str {
        "segment"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "segment", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut errors = ScrapeErrors::new();

            errors.record(scrape_segment_config(conn.pool(), version.dialect(), sink).await);
            errors.record(scrape_disk_free(conn.pool(), sink).await);

            errors.into_result()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_scraper_name() {
        let scraper = SegmentScraper::new();
        assert_eq!(scraper.name(), "segment");
        assert!(scraper.enabled_by_default());
    }

    #[test]
    fn test_code_mappings() {
        assert!((segment_status("u") - 1.0).abs() < f64::EPSILON);
        assert!((segment_status("U") - 1.0).abs() < f64::EPSILON);
        assert!(segment_status("d").abs() < f64::EPSILON);
        assert!(segment_status("?").abs() < f64::EPSILON);

        assert!((segment_role("p") - 1.0).abs() < f64::EPSILON);
        assert!((segment_role("m") - 2.0).abs() < f64::EPSILON);
        assert!((segment_role("x") - 2.0).abs() < f64::EPSILON);

        assert!((segment_mode("s") - 1.0).abs() < f64::EPSILON);
        assert!((segment_mode("r") - 2.0).abs() < f64::EPSILON);
        assert!((segment_mode("c") - 3.0).abs() < f64::EPSILON);
        assert!((segment_mode("n") - 4.0).abs() < f64::EPSILON);
        assert!((segment_mode("") - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_legacy_dialect_has_no_datadir() {
        let legacy = segment_config_sql(EngineVersion::new(5).dialect());
        let current = segment_config_sql(EngineVersion::new(6).dialect());

        assert!(legacy.contains("NULL::text AS datadir"));
        assert!(current.contains("datadir::text"));
        assert!(!current.contains("NULL::text"));
    }

    #[test]
    fn test_segment_emits_same_schema_without_datadir() {
        let segment = SegmentConfig {
            dbid: "2".to_string(),
            content: "0".to_string(),
            role: "p".to_string(),
            preferred_role: "p".to_string(),
            mode: "s".to_string(),
            status: "u".to_string(),
            port: "6000".to_string(),
            hostname: "sdw1".to_string(),
            address: "sdw1".to_string(),
            datadir: None,
        };

        let mut sink = MetricSink::new();
        segment.emit(&mut sink);

        assert_eq!(sink.len(), 3);
        for sample in sink.samples() {
            assert_eq!(sample.labels().len(), SEGMENT_LABELS.len());
            assert_eq!(sample.label("data_dir"), Some(""));
            assert_eq!(sample.label("dbid"), Some("2"));
        }
    }
}
