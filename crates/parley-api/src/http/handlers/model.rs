//! Backend model switching.
//!
//! - GET /api/v1/model - Active model and the configured aliases
//! - PUT /api/v1/model - Switch the active model by alias

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SwitchModelBody {
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub model: String,
    pub available: Vec<String>,
}

fn model_info(state: &AppState) -> ModelInfo {
    let backend = state.chat_service.backend();
    ModelInfo {
        model: backend.current_model(),
        available: backend.aliases().map(str::to_string).collect(),
    }
}

/// GET /api/v1/model
pub async fn get_model(State(state): State<AppState>) -> Json<ApiResponse<ModelInfo>> {
    let start = Instant::now();
    Json(ApiResponse::success(model_info(&state), start))
}

/// PUT /api/v1/model
pub async fn switch_model(
    State(state): State<AppState>,
    Json(body): Json<SwitchModelBody>,
) -> Result<Json<ApiResponse<ModelInfo>>, AppError> {
    let start = Instant::now();
    if state.chat_service.backend().switch_model(&body.model).is_none() {
        return Err(AppError::Validation(format!(
            "unknown model '{}'",
            body.model
        )));
    }
    Ok(Json(ApiResponse::success(model_info(&state), start)))
}
