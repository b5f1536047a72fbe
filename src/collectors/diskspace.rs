use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, EngineVersion};
use crate::collectors::errors::decode_rows;
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::fetch_gpperfmon;
use anyhow::{Error, Result};
use futures::future::BoxFuture;
use sqlx::FromRow;
use tracing::instrument;

const DISKSPACE_SQL: &str = r"
    SELECT hostname::text, filesystem::text,
           total_bytes::float8, bytes_used::float8, bytes_available::float8
    FROM diskspace_now
";

static FS_TOTAL: MetricDesc = MetricDesc::gauge(
    "greenplum_node_fs_total_bytes",
    "Total size of the filesystem",
    &["hostname", "filesystem"],
);

static FS_USED: MetricDesc = MetricDesc::gauge(
    "greenplum_node_fs_used_bytes",
    "Used space on the filesystem",
    &["hostname", "filesystem"],
);

static FS_AVAILABLE: MetricDesc = MetricDesc::gauge(
    "greenplum_node_fs_available_bytes",
    "Available space on the filesystem",
    &["hostname", "filesystem"],
);

/// Filesystem usage of every segment host.
#[derive(Clone, Debug, Default)]
pub struct DiskspaceScraper;

impl DiskspaceScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[derive(Debug, FromRow)]
struct Filesystem {
    hostname: String,
    filesystem: String,
    total_bytes: f64,
    bytes_used: f64,
    bytes_available: f64,
}

impl Filesystem {
    fn emit(&self, sink: &mut MetricSink) {
        let labels = [self.hostname.as_str(), self.filesystem.as_str()];
        sink.emit(&FS_TOTAL, self.total_bytes, &labels);
        sink.emit(&FS_USED, self.bytes_used, &labels);
        sink.emit(&FS_AVAILABLE, self.bytes_available, &labels);
    }
}

impl Scraper for DiskspaceScraper {
    fn name(&self) -> &'static str {
        "diskspace"
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "diskspace", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        _version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let rows = fetch_gpperfmon(conn, "diskspace", DISKSPACE_SQL).await?;

            decode_rows(
                &rows,
                |row| Filesystem::from_row(row).map_err(Error::from),
                |fs| fs.emit(sink),
            )
            .into_result()
        })
    }
}
