use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, EngineVersion};
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::query_span;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use sqlx::PgPool;
use tracing::{instrument, warn};
use tracing_futures::Instrument as _;

const MAX_CONNECTIONS_SQL: &str = "SELECT current_setting('max_connections')::float8";
const SUPERUSER_RESERVED_SQL: &str =
    "SELECT current_setting('superuser_reserved_connections')::float8";

static MAX_CONNECTIONS: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_max_connections",
    "Max connections available to non-superusers of the Greenplum cluster",
    &[],
);

/// `max_connections` minus `superuser_reserved_connections`.
#[derive(Clone, Debug, Default)]
pub struct MaxConnectionsScraper;

impl MaxConnectionsScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

async fn setting(pool: &PgPool, sql: &'static str) -> Result<f64> {
    sqlx::query_scalar::<_, f64>(sql)
        .fetch_one(pool)
        .instrument(query_span("max_connections", sql))
        .await
        .with_context(|| format!("reading setting with {sql}"))
}

impl Scraper for MaxConnectionsScraper {
    fn name(&self) -> &'static str {
        "max_connections"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "max_connections", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        _version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let max = setting(conn.pool(), MAX_CONNECTIONS_SQL).await?;

            let reserved = match setting(conn.pool(), SUPERUSER_RESERVED_SQL).await {
                Ok(reserved) => reserved,
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "assuming no reserved superuser connections");
                    0.0
                }
            };

            sink.emit(&MAX_CONNECTIONS, max - reserved, &[]);

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_connections_scraper_name() {
        let scraper = MaxConnectionsScraper::new();
        assert_eq!(scraper.name(), "max_connections");
        assert!(scraper.enabled_by_default());
    }
}
