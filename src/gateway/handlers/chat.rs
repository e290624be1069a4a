//! Production chat handler.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use crate::coach::ProfileView;
use crate::db::{ChatStore, ProfileStore};
use crate::gateway::server::{GatewayState, error_response};
use crate::gateway::types::ChatSendResponse;
use crate::llm::ChatMessage;

/// How much stored history is fed back into the coach per message. The
/// coach applies its own smaller window on top.
const CHAT_HISTORY_LIMIT: i64 = 50;

/// POST /api/chat/send
///
/// Persists the user message, asks the coach for a reply over the
/// recent history, persists the reply. A coach failure leaves the user
/// message stored and returns 500.
pub async fn chat_send_handler(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ChatSendResponse>, (StatusCode, String)> {
    let user_id = body
        .get("user_id")
        .and_then(|v| v.as_str())
        .ok_or((StatusCode::BAD_REQUEST, "Missing 'user_id' field".to_string()))?;
    let content = body
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or((StatusCode::BAD_REQUEST, "Missing 'content' field".to_string()))?;
    let topic = body.get("topic").and_then(|v| v.as_str());

    let profile = state
        .db
        .get_profile(user_id)
        .await
        .map_err(|e| error_response(e.into()))?
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("No profile for user {user_id}"),
        ))?;

    let user_message = state
        .db
        .add_chat_message(user_id, "user", content)
        .await
        .map_err(|e| error_response(e.into()))?;

    // The window already includes the message persisted above.
    let records = state
        .db
        .recent_chat_messages(user_id, CHAT_HISTORY_LIMIT)
        .await
        .map_err(|e| error_response(e.into()))?;
    let history: Vec<ChatMessage> = records
        .iter()
        .map(|m| {
            if m.role == "assistant" {
                ChatMessage::assistant(&m.content)
            } else {
                ChatMessage::user(&m.content)
            }
        })
        .collect();

    let view = ProfileView::from(&profile);
    let reply = state
        .coach
        .reply(&view, topic, &history)
        .await
        .map_err(|e| error_response(e.into()))?;

    let assistant_message = state
        .db
        .add_chat_message(user_id, "assistant", &reply)
        .await
        .map_err(|e| error_response(e.into()))?;

    tracing::debug!(user_id, "Chat message answered");

    Ok(Json(ChatSendResponse {
        reply,
        user_message_id: user_message.id,
        assistant_message_id: assistant_message.id,
    }))
}
