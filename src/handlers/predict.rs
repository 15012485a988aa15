//! Prediction handler

use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crate::models::{PredictRequest, PredictResponse};
use crate::{AppResult, AppState};

/// Classify a caller-supplied reading. Does not touch the latest-state store.
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> AppResult<Json<PredictResponse>> {
    let Json(req) = payload?;

    let classification = state.classifier.classify(&req.features())?;

    Ok(Json(PredictResponse {
        prediction: classification.label.class(),
        confidence: classification.confidence,
    }))
}
