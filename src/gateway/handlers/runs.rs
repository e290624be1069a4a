//! Run lifecycle and inspection handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::db::{EvaluationStore, RunStore};
use crate::gateway::server::{GatewayState, error_response};
use crate::gateway::types::{
    EndRunResponse, EvaluationInfo, RunDetailResponse, RunInfo, RunListResponse, TurnResponse,
};
use crate::sim::Evaluator;

fn parse_run_id(id: &str) -> Result<Uuid, (StatusCode, String)> {
    Uuid::parse_str(id).map_err(|_| (StatusCode::BAD_REQUEST, "Invalid run ID".to_string()))
}

/// GET /api/sim/runs
pub async fn runs_list_handler(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<RunListResponse>, (StatusCode, String)> {
    let runs = state
        .db
        .list_runs()
        .await
        .map_err(|e| error_response(e.into()))?;

    Ok(Json(RunListResponse {
        runs: runs.iter().map(Into::into).collect(),
    }))
}

/// POST /api/sim/runs
///
/// Body: `persona_id` (required), `topic` (required).
pub async fn runs_create_handler(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<RunInfo>, (StatusCode, String)> {
    let persona_id = body
        .get("persona_id")
        .and_then(|v| v.as_str())
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Missing 'persona_id' field".to_string(),
        ))?;
    let persona_id = Uuid::parse_str(persona_id)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid persona ID".to_string()))?;
    let topic = body
        .get("topic")
        .and_then(|v| v.as_str())
        .ok_or((StatusCode::BAD_REQUEST, "Missing 'topic' field".to_string()))?;

    let run = state
        .simulator
        .create_run(persona_id, topic)
        .await
        .map_err(error_response)?;

    Ok(Json((&run).into()))
}

/// GET /api/sim/runs/{id}
pub async fn runs_detail_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<RunDetailResponse>, (StatusCode, String)> {
    let run_id = parse_run_id(&id)?;

    let run = state
        .db
        .get_run(run_id)
        .await
        .map_err(|e| error_response(e.into()))?
        .ok_or((StatusCode::NOT_FOUND, format!("Run {run_id} not found")))?;

    let messages = state
        .db
        .list_run_messages(run_id)
        .await
        .map_err(|e| error_response(e.into()))?;
    let evaluation = state
        .db
        .get_evaluation(run_id)
        .await
        .map_err(|e| error_response(e.into()))?;

    Ok(Json(RunDetailResponse {
        run: (&run).into(),
        messages: messages.iter().map(Into::into).collect(),
        evaluation: evaluation.as_ref().map(Into::into),
    }))
}

/// POST /api/sim/runs/{id}/start
pub async fn runs_start_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<RunInfo>, (StatusCode, String)> {
    let run_id = parse_run_id(&id)?;
    let run = state
        .simulator
        .start_run(run_id)
        .await
        .map_err(error_response)?;
    Ok(Json((&run).into()))
}

/// POST /api/sim/runs/{id}/turn
///
/// Body is optional; `message` substitutes the persona's utterance.
/// The response carries the transcript's quick-check standing so
/// operators can watch candidacy forming.
pub async fn runs_turn_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    body: Option<Json<serde_json::Value>>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    let run_id = parse_run_id(&id)?;
    let manual_message = match body.as_ref().and_then(|Json(v)| v.get("message")) {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Field 'message' must be a string".to_string(),
            ));
        }
    };

    let outcome = state
        .simulator
        .advance_run(run_id, manual_message)
        .await
        .map_err(error_response)?;

    let messages = state
        .db
        .list_run_messages(run_id)
        .await
        .map_err(|e| error_response(e.into()))?;
    let quick_check = Evaluator::quick_check(&messages);

    Ok(Json(TurnResponse {
        persona_message: (&outcome.persona_message).into(),
        coach_message: (&outcome.coach_message).into(),
        quick_check: (&quick_check).into(),
    }))
}

/// POST /api/sim/runs/{id}/end
pub async fn runs_end_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<EndRunResponse>, (StatusCode, String)> {
    let run_id = parse_run_id(&id)?;
    let (run, evaluation) = state
        .simulator
        .end_run(run_id)
        .await
        .map_err(error_response)?;

    Ok(Json(EndRunResponse {
        run: (&run).into(),
        evaluation: (&evaluation).into(),
    }))
}

/// POST /api/sim/runs/{id}/stop
pub async fn runs_stop_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<RunInfo>, (StatusCode, String)> {
    let run_id = parse_run_id(&id)?;
    let run = state
        .simulator
        .stop_run(run_id)
        .await
        .map_err(error_response)?;
    Ok(Json((&run).into()))
}

/// POST /api/sim/runs/{id}/evaluate
pub async fn runs_evaluate_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<EvaluationInfo>, (StatusCode, String)> {
    let run_id = parse_run_id(&id)?;
    let evaluation = state
        .simulator
        .evaluate_run(run_id)
        .await
        .map_err(error_response)?;
    Ok(Json((&evaluation).into()))
}
