//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::ingestion::IngestionStats;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    alive: bool,
    /// Ingestion has delivered at least one reading. Never reverts.
    mqtt_connected: bool,
    has_received_data: bool,
    ingestion_enabled: bool,
    ingestion_cycles: u64,
    #[serde(flatten)]
    ingestion: IngestionStats,
    version: &'static str,
    timestamp: i64,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let has_received_data = state.store.has_received_data();

    Json(HealthResponse {
        status: "ok",
        alive: true,
        mqtt_connected: has_received_data,
        has_received_data,
        ingestion_enabled: state.config.ingestion_enabled,
        ingestion_cycles: state.store.cycles(),
        ingestion: state.ingestion.stats(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
    })
}
