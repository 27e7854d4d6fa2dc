//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Readiness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Component checked
    pub component: String,
    /// `healthy` or `unhealthy`
    pub status: String,
    /// Detail
    pub message: String,
}

/// Liveness: the process is serving requests. Does not touch the database.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness: the datastore answers a ping.
///
/// # Status Codes
///
/// - 200 OK: store reachable
/// - 503 Service Unavailable: store unreachable
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthReport {
                component: "store".to_string(),
                status: "healthy".to_string(),
                message: "Store is reachable".to_string(),
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthReport {
                    component: "store".to_string(),
                    status: "unhealthy".to_string(),
                    message: err.to_string(),
                }),
            )
        }
    }
}
