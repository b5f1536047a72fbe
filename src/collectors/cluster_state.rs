use crate::collectors::Scraper;
use crate::collectors::connection::{Connection, Dialect, EngineVersion, parse_release};
use crate::collectors::errors::ScrapeErrors;
use crate::collectors::sample::{MetricDesc, MetricSink};
use crate::collectors::util::{exactly_one, query_span, unix_seconds};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;
use tracing::{debug, instrument};
use tracing_futures::Instrument as _;

const CHECK_STATE_SQL: &str = "SELECT count(1) FROM gp_dist_random('gp_id')";
const VERSION_SQL: &str = "SELECT version()";
const MASTER_SQL: &str =
    "SELECT hostname::text FROM gp_segment_configuration WHERE content = -1 AND role = 'p'";
const STANDBY_SQL: &str =
    "SELECT hostname::text FROM gp_segment_configuration WHERE content = -1 AND role = 'm'";
const UPTIME_SQL: &str = "SELECT extract(epoch FROM now() - pg_postmaster_start_time())::float8";
const SYNC_SQL: &str =
    "SELECT count(*)::float8 FROM pg_stat_replication WHERE state = 'streaming'";
const CONFIG_LOAD_TIME_SQL: &str = "SELECT pg_conf_load_time()";
// pg_conf_load_time() does not exist before Greenplum 6; the postmaster start
// is the last time the configuration was certainly loaded.
const CONFIG_LOAD_TIME_SQL_LEGACY: &str = "SELECT pg_postmaster_start_time()";

static STATE: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_state",
    "Whether the Greenplum database is accessible",
    &["version", "master", "standby"],
);

static UPTIME: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_uptime",
    "Duration that the Greenplum database has been up since the last start, in seconds",
    &[],
);

static SYNC: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_sync",
    "Whether the Greenplum master node is synchronizing to the standby",
    &[],
);

static CONFIG_LOAD_TIME: MetricDesc = MetricDesc::gauge(
    "greenplum_cluster_config_last_load_time_seconds",
    "Timestamp of the last configuration reload",
    &[],
);

/// Cluster reachability, release, master/standby hosts, uptime, standby sync
/// and configuration load time.
#[derive(Clone, Debug, Default)]
pub struct ClusterStateScraper;

impl ClusterStateScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[must_use]
pub const fn config_load_time_sql(dialect: Dialect) -> &'static str {
    dialect.pick(CONFIG_LOAD_TIME_SQL_LEGACY, CONFIG_LOAD_TIME_SQL)
}

/// Values read after the segment check succeeded; each one may be missing.
#[derive(Debug, Default)]
struct ClusterState {
    release: Option<String>,
    master: Option<String>,
    standby: Option<String>,
    uptime: Option<f64>,
    sync: Option<f64>,
    config_load_time: Option<DateTime<Utc>>,
}

fn emit_state(state: &ClusterState, sink: &mut MetricSink) {
    sink.emit(
        &STATE,
        1.0,
        &[
            state.release.as_deref().unwrap_or_default(),
            state.master.as_deref().unwrap_or_default(),
            state.standby.as_deref().unwrap_or_default(),
        ],
    );

    if let Some(uptime) = state.uptime {
        sink.emit(&UPTIME, uptime, &[]);
    }
    if let Some(sync) = state.sync {
        sink.emit(&SYNC, sync, &[]);
    }
    if let Some(ts) = state.config_load_time {
        sink.emit(&CONFIG_LOAD_TIME, unix_seconds(ts), &[]);
    }
}

async fn scalar<T>(pool: &PgPool, sql: &'static str) -> Result<Option<T>>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send + Unpin,
{
    let value = sqlx::query_scalar::<_, T>(sql)
        .fetch_optional(pool)
        .instrument(query_span("cluster_state", sql))
        .await?;

    Ok(value)
}

impl Scraper for ClusterStateScraper {
    fn name(&self) -> &'static str {
        "cluster_state"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    #[instrument(
        skip(self, conn, sink),
        level = "info",
        err,
        fields(scraper = "cluster_state", otel.kind = "internal")
    )]
    fn scrape<'a>(
        &'a self,
        conn: &'a Connection,
        version: EngineVersion,
        sink: &'a mut MetricSink,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let pool = conn.pool();

            if let Err(e) = scalar::<i64>(pool, CHECK_STATE_SQL).await {
                sink.emit(&STATE, 0.0, &["", "", ""]);
                return Err(e.context("checking segment state"));
            }

            let mut errors = ScrapeErrors::new();
            let mut state = ClusterState::default();

            if let Some(raw) = errors.record(
                scalar::<String>(pool, VERSION_SQL)
                    .await
                    .and_then(|v| exactly_one(v, "greenplum version")),
            ) {
                match parse_release(&raw) {
                    Some((release, _)) => state.release = Some(release),
                    None => errors.push(anyhow!("greenplum version not found in '{raw}'")),
                }
            }

            state.master = errors.record(
                scalar::<String>(pool, MASTER_SQL)
                    .await
                    .and_then(|v| exactly_one(v, "hostname for master node")),
            );

            // A cluster without a standby is valid.
            state.standby = errors.record(scalar::<String>(pool, STANDBY_SQL).await).flatten();

            state.uptime = errors
                .record(
                    scalar::<Option<f64>>(pool, UPTIME_SQL)
                        .await
                        .and_then(|v| exactly_one(v.flatten(), "start time of greenplum")),
                );

            state.sync = errors.record(
                scalar::<f64>(pool, SYNC_SQL)
                    .await
                    .and_then(|v| exactly_one(v, "greenplum sync status")),
            );

            state.config_load_time = errors.record(
                scalar::<DateTime<Utc>>(pool, config_load_time_sql(version.dialect()))
                    .await
                    .and_then(|v| exactly_one(v, "greenplum config last load time")),
            );

            debug!(?state, "cluster state");
            emit_state(&state, sink);

            errors.into_result()
        })
    }
}
