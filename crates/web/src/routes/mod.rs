use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use chess_eval_core::engine::{BridgeState, EngineCapabilities};
use chess_eval_core::parser::parse_first_game;
use chess_eval_core::{Error, GameEvaluationSet};

use crate::AppState;

pub mod opening;

/// Core errors rendered as `{"error": ...}` with a matching status
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Pgn(_) | Error::InvalidPosition(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::EngineUnavailable(_) | Error::EngineBusy => StatusCode::SERVICE_UNAVAILABLE,
            Error::AnalysisTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Deserialize)]
pub struct EvaluateRequest {
    pub pgn: String,
}

#[derive(Serialize)]
pub struct EngineStatus {
    pub state: BridgeState,
    pub capabilities: EngineCapabilities,
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<GameEvaluationSet>, ApiError> {
    let game = parse_first_game(&request.pgn)?;
    info!("Evaluating {} ({} half-moves)", game.summary(), game.move_count());

    let _turn = state.evaluation_lock.lock().await;
    let set = state
        .pipeline
        .evaluate_pgn_game(&game, |progress| {
            debug!("Evaluation progress {}%", progress.percent());
        })
        .await?;

    Ok(Json(set))
}

pub async fn engine_status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(EngineStatus {
        state: state.engine.state(),
        capabilities: state.engine.capabilities().clone(),
    })
}
