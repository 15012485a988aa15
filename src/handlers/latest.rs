//! Latest reading handler

use axum::{extract::State, Json};

use crate::models::LatestResponse;
use crate::store::LatestState;
use crate::{AppError, AppResult, AppState};

/// Most recent reading and its prediction. Never waits for data.
pub async fn get(State(state): State<AppState>) -> AppResult<Json<LatestResponse>> {
    match state.store.get() {
        LatestState::Present(snapshot) => Ok(Json(LatestResponse {
            sensor: snapshot.reading.clone(),
            prediction: snapshot.result.clone(),
            cycle: snapshot.cycle,
        })),
        LatestState::Empty => Err(AppError::Unavailable(
            "No sensor data received yet, retry later".to_string(),
        )),
    }
}
