use crate::collectors::meta::ExporterMetrics;
use crate::exporter::{ExporterState, GIT_COMMIT_HASH};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    Up,
    Down,
    /// No cycle has run yet.
    Unknown,
}

impl ClusterState {
    fn from_metrics(metrics: &ExporterMetrics) -> Self {
        if metrics.total_scraped() == 0 {
            Self::Unknown
        } else if metrics.is_up() {
            Self::Up
        } else {
            Self::Down
        }
    }

    const fn status(self) -> StatusCode {
        match self {
            Self::Down => StatusCode::SERVICE_UNAVAILABLE,
            Self::Up | Self::Unknown => StatusCode::OK,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    cluster: ClusterState,
}

fn create_health_response(cluster: ClusterState) -> Health {
    Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cluster,
    }
}

// Create response body based on method
fn create_response_body(method: &Method, health: &Health) -> Body {
    if method == Method::GET {
        Json(health).into_response().into_body()
    } else {
        Body::empty()
    }
}

// Create X-App header
fn create_app_headers(health: &Health) -> HeaderMap {
    let short_hash = health.commit.get(0..7).unwrap_or_default();

    let header_value = format!("{}:{}:{}", health.name, health.version, short_hash);

    match header_value.parse::<HeaderValue>() {
        Ok(x_app_header_value) => {
            debug!("X-App header: {:?}", x_app_header_value);
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        }
        Err(err) => {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        }
    }
}

/// Report the reachability seen by the last cycle. Never runs a cycle.
pub async fn health(method: Method, Extension(state): Extension<Arc<ExporterState>>) -> impl IntoResponse {
    let cluster = ClusterState::from_metrics(state.orchestrator.metrics());
    let health = create_health_response(cluster);
    let body = create_response_body(&method, &health);
    let headers = create_app_headers(&health);

    debug!(?cluster, "health");

    (cluster.status(), headers, body)
}
