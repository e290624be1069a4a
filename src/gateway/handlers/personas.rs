//! Persona listing, seeding, and user cloning handlers.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use crate::db::PersonaStore;
use crate::gateway::server::{GatewayState, error_response};
use crate::gateway::types::{CloneUserResponse, PersonaListResponse, SeedResponse};

/// GET /api/sim/personas
pub async fn personas_list_handler(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<PersonaListResponse>, (StatusCode, String)> {
    let personas = state
        .db
        .list_personas()
        .await
        .map_err(|e| error_response(e.into()))?;

    Ok(Json(PersonaListResponse {
        personas: personas.iter().map(Into::into).collect(),
    }))
}

/// POST /api/sim/personas/seed
pub async fn personas_seed_handler(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<SeedResponse>, (StatusCode, String)> {
    let outcome = state
        .simulator
        .seed_personas()
        .await
        .map_err(error_response)?;

    Ok(Json(SeedResponse {
        created: outcome.created,
        skipped: outcome.skipped,
    }))
}

/// POST /api/sim/clone-user
///
/// Body: `user_id` (required), `include_history` (optional, default true).
pub async fn clone_user_handler(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<CloneUserResponse>, (StatusCode, String)> {
    let user_id = body
        .get("user_id")
        .and_then(|v| v.as_str())
        .ok_or((StatusCode::BAD_REQUEST, "Missing 'user_id' field".to_string()))?;
    let include_history = body
        .get("include_history")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let outcome = state
        .simulator
        .clone_user(user_id, include_history)
        .await
        .map_err(error_response)?;

    Ok(Json(CloneUserResponse {
        persona: (&outcome.persona).into(),
        run: outcome.run.as_ref().map(Into::into),
        copied_messages: outcome.copied_messages,
    }))
}
