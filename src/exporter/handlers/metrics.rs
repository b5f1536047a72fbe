use crate::exporter::ExporterState;
use anyhow::Result;
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use prometheus::{TEXT_FORMAT, TextEncoder, proto::MetricFamily};
use std::sync::Arc;
use tracing::{debug, error};

fn encode(state: &ExporterState, mut families: Vec<MetricFamily>) -> Result<String> {
    if let Some(process) = &state.process {
        families.extend(process.gather());
    }

    let mut buffer = String::new();
    TextEncoder::new().encode_utf8(&families, &mut buffer)?;

    Ok(buffer)
}

/// Run one collection cycle and render it in the Prometheus text format.
pub async fn metrics(Extension(state): Extension<Arc<ExporterState>>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static(TEXT_FORMAT),
    );

    let report = state.orchestrator.collect().await;

    debug!(outcome = ?report.outcome, samples = report.sink.len(), "cycle finished");

    match encode(&state, report.sink.gather()) {
        Ok(body) => (StatusCode::OK, headers, body),
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                format!("Error encoding metrics: {e}"),
            )
        }
    }
}
