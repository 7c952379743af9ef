//! Liveness and banner handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::db;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: db::DatabaseHealth,
    pub websocket_connections: usize,
    pub version: &'static str,
}

/// GET / - service banner
pub async fn root() -> &'static str {
    "AgriLink API Server"
}

/// GET /health - reports 503 while the database is unreachable
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = db::check_health(&state.db_pool).await;
    let (status, code) = if database.reachable {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(HealthResponse {
            status,
            database,
            websocket_connections: state.ws_state.connection_count().await,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
