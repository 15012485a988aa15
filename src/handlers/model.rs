//! Model status handler

use axum::{extract::State, Json};

use crate::classifier::ModelStatus;
use crate::{AppError, AppResult, AppState};

pub async fn status(State(state): State<AppState>) -> AppResult<Json<ModelStatus>> {
    state
        .classifier
        .status()
        .map(Json)
        .ok_or_else(|| AppError::Unavailable("Classifier does not report model status".to_string()))
}
