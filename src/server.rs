//! HTTP front end over the latest published report.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::metrics::InspectionMetrics;
use crate::report::render::{build_status, build_summary_response, render_text, RunState};
use crate::report::LatestReport;
use crate::types::{CheckOutcome, Severity};

pub const STATUS_HEADER: &str = "x-inspection-status";
pub const STATUS_INFO_HEADER: &str = "x-inspection-status-info";

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    (
        "content-security-policy",
        "default-src 'none'; script-src 'self'; style-src 'self'; frame-src 'none'; font-src 'self'; \
         form-action 'none'; frame-ancestors 'none'; object-src 'none'; base-uri 'none'",
    ),
    ("cache-control", "no-cache, no-store, must-revalidate"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("x-xss-protection", "1; mode=block"),
    ("x-download-options", "noopen"),
];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub latest: LatestReport,
    pub metrics: InspectionMetrics,
    pub environment: Option<String>,
}

async fn security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    for &(name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

// Header values must be visible ASCII; failure messages are free text.
fn header_value(text: &str) -> HeaderValue {
    let cleaned: String = text
        .chars()
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '?' })
        .collect();
    HeaderValue::from_str(&cleaned).unwrap_or_else(|_| HeaderValue::from_static("unavailable"))
}

async fn status_headers(state: &AppState) -> (HeaderMap, String) {
    let report = state.latest.current().await;
    let status = build_status(report.as_deref());
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(STATUS_HEADER),
        HeaderValue::from_static(if status.healthy { "1" } else { "0" }),
    );
    headers.insert(HeaderName::from_static(STATUS_INFO_HEADER), header_value(&status.info));
    (headers, status.info)
}

async fn summary_text(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (mut headers, _) = status_headers(&state).await;
    let report = state.latest.current().await;
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    (headers, render_text(state.environment.as_deref(), report.as_deref()))
}

async fn summary_json(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.latest.current().await;
    Json(build_summary_response(state.environment.as_deref(), report.as_deref()))
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (headers, info) = status_headers(&state).await;
    (StatusCode::OK, headers, info)
}

#[derive(Debug, Deserialize)]
struct OutcomesQuery {
    severity: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutcomesResponse {
    state: RunState,
    severity: Option<Severity>,
    outcomes: Vec<CheckOutcome>,
}

async fn outcomes(State(state): State<Arc<AppState>>, Query(query): Query<OutcomesQuery>) -> Response {
    let severity = match query.severity.as_deref().map(str::parse::<Severity>).transpose() {
        Ok(severity) => severity,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": e.to_string() }))).into_response();
        }
    };

    let report = state.latest.current().await;
    let Some(report) = report else {
        return Json(OutcomesResponse { state: RunState::NotYetRun, severity, outcomes: Vec::new() }).into_response();
    };

    let selected: Vec<Severity> = match severity {
        Some(s) => vec![s],
        None => Severity::ALL.to_vec(),
    };
    let outcomes = selected
        .into_iter()
        .flat_map(|s| report.outcomes(s).iter().cloned())
        .collect();
    Json(OutcomesResponse { state: RunState::Completed, severity, outcomes }).into_response()
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Metrics encoding failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(summary_text))
        .route("/summarize", get(summary_text))
        .route("/v1/summarize", get(summary_json))
        .route("/v1/outcomes", get(outcomes))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .layer(middleware::map_response(security_headers))
        .with_state(state)
}

/// Serve until the future completes or the listener fails.
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status server to {}", addr))?;
    info!(addr = %addr, "Starting status server");
    axum::serve(listener, create_router(state))
        .await
        .context("Status server stopped")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::report::ResultClassifier;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            latest: LatestReport::new(),
            metrics: InspectionMetrics::new().unwrap(),
            environment: Some("staging".to_string()),
        })
    }

    async fn publish_sample(state: &AppState) {
        let classifier = ResultClassifier::new();
        classifier.ingest(CheckOutcome::failure("prod", "canal-scaling", "Desired: 3 | Available: 2"));
        classifier.ingest(CheckOutcome::success("prod", "node-health", "passed node inspection"));
        classifier.ingest(CheckOutcome::success("dev", "node-health", "passed node inspection"));
        let report = classifier.summarize();
        state.metrics.record(&report);
        state.latest.publish(report).await;
    }

    async fn get(state: Arc<AppState>, uri: &str) -> Response {
        create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_summary_before_first_run() {
        let response = get(state(), "/v1/summarize").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["message"], "not yet run");
        assert!(json["fails"].is_null());
        assert!(json["summarize"].is_null());
        assert_eq!(json["environment"], "staging");
    }

    #[tokio::test]
    async fn test_summary_after_run() {
        let state = state();
        publish_sample(&state).await;

        let json = body_json(get(state, "/v1/summarize").await).await;
        assert_eq!(json["fails"]["count"], 1);
        assert_eq!(json["success"]["count"], 2);
        assert_eq!(json["summarize"]["total"], 3);
        assert_eq!(json["summarize"]["absolute"]["warnings"], 0);
    }

    #[tokio::test]
    async fn test_status_headers() {
        let state = state();
        let response = get(Arc::clone(&state), "/status").await;
        assert_eq!(response.headers()[STATUS_HEADER], "0");
        assert!(response.headers()[STATUS_INFO_HEADER].to_str().unwrap().starts_with("UNHEALTHY"));

        publish_sample(&state).await;
        let response = get(state, "/status").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[STATUS_HEADER], "0");
        assert!(response.headers()[STATUS_INFO_HEADER].to_str().unwrap().starts_with("FAILED"));
    }

    #[tokio::test]
    async fn test_outcomes_filter() {
        let state = state();
        publish_sample(&state).await;

        let json = body_json(get(Arc::clone(&state), "/v1/outcomes?severity=success").await).await;
        assert_eq!(json["outcomes"].as_array().unwrap().len(), 2);
        assert_eq!(json["severity"], "success");

        let json = body_json(get(Arc::clone(&state), "/v1/outcomes").await).await;
        assert_eq!(json["outcomes"].as_array().unwrap().len(), 3);
        assert_eq!(json["outcomes"][0]["severity"], "failure");

        let response = get(state, "/v1/outcomes?severity=critical").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_security_headers_and_metrics() {
        let state = state();
        publish_sample(&state).await;

        let response = get(state, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-download-options"], "noopen");
        assert_eq!(response.headers()["strict-transport-security"], "max-age=31536000; includeSubDomains");
        assert!(response.headers().contains_key("content-security-policy"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("fleet_inspector_total_checks 3"));
    }

    #[tokio::test]
    async fn test_text_summary() {
        let state = state();
        let response = get(Arc::clone(&state), "/").await;
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("not yet run"));

        publish_sample(&state).await;
        let response = get(state, "/summarize").await;
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        assert!(text.contains("Fleet inspection - staging"));
        assert!(text.contains("canal-scaling"));
    }
}
