//! Operator HTTP endpoint
//!
//! - `GET /health`  - liveness, always `OK` while the process runs
//! - `GET /metrics` - Prometheus text format
//! - `GET /status`  - relay progress as JSON

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::metrics;

/// Relay progress shared between the loop and the HTTP server
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub cursor: u64,
    pub processed: usize,
    pub consecutive_failures: u32,
    /// Payouts confirmed since startup
    pub paid_total: u64,
    pub last_outcome: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

impl Default for RelayStatus {
    fn default() -> Self {
        Self {
            cursor: 0,
            processed: 0,
            consecutive_failures: 0,
            paid_total: 0,
            last_outcome: None,
            last_cycle_at: None,
            started_at: Utc::now(),
        }
    }
}

pub type SharedStatus = Arc<RwLock<RelayStatus>>;

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: RelayStatus,
    uptime_secs: i64,
}

async fn health() -> &'static str {
    "OK"
}

async fn relay_status(State(shared): State<SharedStatus>) -> Json<StatusResponse> {
    let status = shared.read().await.clone();
    let uptime_secs = (Utc::now() - status.started_at).num_seconds();
    Json(StatusResponse {
        status,
        uptime_secs,
    })
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}

pub fn router(status: SharedStatus) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/status", get(relay_status))
        .with_state(status)
}

/// Serve the operator endpoint until the process exits
pub async fn start_server(port: u16, status: SharedStatus) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind API server on {}", addr))?;

    metrics::UP.set(1);
    info!("API server listening on {}", addr);

    axum::serve(listener, router(status))
        .await
        .wrap_err("API server failed")?;
    Ok(())
}
