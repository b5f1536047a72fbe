//! Shared helpers for scrapers:
//! - `db.query` client spans around each round trip.
//! - Per-query deadlines, treated as failures and never retried.
//! - "exactly one row" checks.
//! - Timestamp conversion for `*_timestamp`/`*_time_seconds` gauges.
//! - Reads from the gpperfmon database over an auxiliary connection.

use crate::collectors::connection::Connection;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use sqlx::Connection as _;
use sqlx::postgres::PgRow;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{Span, debug, info_span};
use tracing_futures::Instrument as _;

/// Deadline for cheap catalog lookups (segment configuration).
pub const SHORT_DEADLINE: Duration = Duration::from_secs(2);

/// Deadline for metadata-heavy queries that fan out over every segment.
pub const LONG_DEADLINE: Duration = Duration::from_secs(10);

/// Database written by the Greenplum performance monitor agents.
pub const GPPERFMON_DATABASE: &str = "gpperfmon";

/// Client span for one SQL round trip.
#[must_use]
pub fn query_span(scraper: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        otel.kind = "client",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = statement,
        scraper = scraper
    )
}

/// Await `fut`, failing with a descriptive error when `deadline` passes first.
///
/// # Errors
///
/// Returns the query error, or a timeout error naming `what`.
pub async fn with_deadline<T, E, F>(deadline: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>,
{
    match timeout(deadline, fut).await {
        Ok(res) => res.map_err(Into::into),
        Err(_) => Err(anyhow!(
            "{what} timed out after {}s",
            deadline.as_secs()
        )),
    }
}

/// Run `sql` against the gpperfmon database and release the connection.
///
/// # Errors
///
/// Returns an error if gpperfmon cannot be reached or the query fails.
pub async fn fetch_gpperfmon(
    conn: &Connection,
    scraper: &'static str,
    sql: &'static str,
) -> Result<Vec<PgRow>> {
    let mut aux = conn.open_auxiliary(GPPERFMON_DATABASE).await?;

    let rows = with_deadline(
        LONG_DEADLINE,
        scraper,
        sqlx::query(sql)
            .fetch_all(&mut aux)
            .instrument(query_span(scraper, sql)),
    )
    .await;

    if let Err(e) = aux.close().await {
        debug!(scraper, error = %e, "closing gpperfmon connection");
    }

    rows.context("querying gpperfmon")
}

/// Unwrap the single row of a query that must return exactly one.
///
/// # Errors
///
/// Returns `"<what> not found"` for an empty result.
pub fn exactly_one<T>(row: Option<T>, what: &str) -> Result<T> {
    row.ok_or_else(|| anyhow!("{what} not found"))
}

/// Seconds since the Unix epoch.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn unix_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp() as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_deadline_passes_value_through() {
        let got = with_deadline(SHORT_DEADLINE, "fast query", async {
            Ok::<_, anyhow::Error>(3)
        })
        .await
        .unwrap();
        assert_eq!(got, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_times_out() {
        let err = with_deadline(SHORT_DEADLINE, "segment configuration", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "segment configuration timed out after 2s");
    }

    #[test]
    fn test_exactly_one() {
        assert_eq!(exactly_one(Some(1), "bgwriter").unwrap(), 1);
        assert_eq!(
            exactly_one::<i32>(None, "bgwriter").unwrap_err().to_string(),
            "bgwriter not found"
        );
    }

    #[test]
    fn test_unix_seconds() {
        let ts = DateTime::parse_from_rfc3339("2020-06-16T14:09:47Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!((unix_seconds(ts) - 1_592_316_587.0).abs() < f64::EPSILON);
    }
}
