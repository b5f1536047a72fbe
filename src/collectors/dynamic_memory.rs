use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, EngineVersion};
use crate::collectors::errors::decode_rows;
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::fetch_gpperfmon;
use anyhow::{Error, Result};
use futures::future::BoxFuture;
use sqlx::FromRow;
use tracing::instrument;

// memory_info is a history table; keep the latest sample of every host.
const DYNAMIC_MEMORY_SQL: &str = r"
    SELECT DISTINCT ON (hostname)
           hostname::text,
           dynamic_memory_used_mb::float8,
           dynamic_memory_available_mb::float8
    FROM memory_info
    ORDER BY hostname, ctime DESC
";

static USED_MB: MetricDesc = MetricDesc::gauge(
    "greenplum_node_dynamic_memory_used_mb",
    "Dynamic memory used by segments on the host, in MB",
    &["hostname"],
);

static AVAILABLE_MB: MetricDesc = MetricDesc::gauge(
    "greenplum_node_dynamic_memory_available_mb",
    "Dynamic memory still available to segments on the host, in MB",
    &["hostname"],
);

#[derive(Clone, Debug, Default)]
pub struct DynamicMemoryScraper;

impl DynamicMemoryScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[derive(Debug, FromRow)]
struct HostMemory {
    hostname: String,
    dynamic_memory_used_mb: f64,
    dynamic_memory_available_mb: f64,
}

impl HostMemory {
    fn emit(&self, sink: &mut MetricSink) {
        let host = [self.hostname.as_str()];
        sink.emit(&USED_MB, self.dynamic_memory_used_mb, &host);
        sink.emit(&AVAILABLE_MB, self.dynamic_memory_available_mb, &host);
    }
}

impl Scraper for DynamicMemoryScraper {
    fn name(&self) -> &'static str {
        "dynamic_memory"
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "dynamic_memory", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        _version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let rows = fetch_gpperfmon(conn, "dynamic_memory", DYNAMIC_MEMORY_SQL).await?;

            decode_rows(
                &rows,
                |row| HostMemory::from_row(row).map_err(Error::from),
                |memory| memory.emit(sink),
            )
            .into_result()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_memory_scraper_name() {
        let scraper = DynamicMemoryScraper::new();
        assert_eq!(scraper.name(), "dynamic_memory");
        assert!(!scraper.enabled_by_default());
    }

    #[test]
    fn test_latest_sample_per_host() {
        assert!(DYNAMIC_MEMORY_SQL.contains("DISTINCT ON (hostname)"));
        assert!(DYNAMIC_MEMORY_SQL.contains("ctime DESC"));
    }

    #[test]
    fn test_emit_pair_per_host() {
        let mut sink = MetricSink::new();
        HostMemory {
            hostname: "sdw3".to_string(),
            dynamic_memory_used_mb: 512.0,
            dynamic_memory_available_mb: 7680.0,
        }
        .emit(&mut sink);

        assert_eq!(sink.len(), 2);
        assert!(sink.samples().iter().all(|s| s.label("hostname") == Some("sdw3")));
    }
}
