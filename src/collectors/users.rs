use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, EngineVersion};
use crate::collectors::errors::decode_rows;
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::query_span;
use anyhow::{Error, Result};
use futures::future::BoxFuture;
use sqlx::Row;
use tracing::instrument;
use tracing_futures::Instrument as _;

const USERS_SQL: &str = "SELECT usename::text FROM pg_catalog.pg_user";

static USERS_COUNT: MetricDesc = MetricDesc::gauge(
    "greenplum_server_users_total_count",
    "Total number of user accounts",
    &[],
);

static USERS_NAME: MetricDesc = MetricDesc::gauge(
    "greenplum_server_users_name_list",
    "One series per user account",
    &["username"],
);

#[derive(Clone, Debug, Default)]
pub struct UsersScraper;

impl UsersScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[allow(clippy::cast_precision_loss)]
fn emit_users<'u>(names: impl IntoIterator<Item = &'u str>, sink: &mut MetricSink) {
    let mut count = 0_usize;

    for name in names {
        sink.emit(&USERS_NAME, 1.0, &[name]);
        count += 1;
    }

    sink.emit(&USERS_COUNT, count as f64, &[]);
}

impl Scraper for UsersScraper {
    fn name(&self) -> &'static str {
        "users"
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "users", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        _version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let rows = sqlx::query(USERS_SQL)
                .fetch_all(conn.pool())
                .instrument(query_span("users", USERS_SQL))
                .await?;

            let mut names: Vec<String> = Vec::with_capacity(rows.len());
            let errors = decode_rows(
                &rows,
                |row| row.try_get::<String, _>(0).map_err(Error::from),
                |name| names.push(name),
            );

            emit_users(names.iter().map(String::as_str), sink);

            errors.into_result()
        })
    }
}
