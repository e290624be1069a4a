//! User coaching profiles and chat history records.
//!
//! A profile mirrors what the mobile client collects during onboarding: a
//! display name plus the fields the coach prompt is built from (tension
//! type, communication style, focus area). Chat history is stored per user
//! and replayed into completion requests.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A user's coaching profile.
#[derive(Debug, Clone)]
pub struct CoachingProfile {
    pub user_id: String,
    pub display_name: String,
    pub tension_type: Option<String>,
    pub communication_style: Option<String>,
    pub focus_area: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CoachingProfile {
    /// Create a fresh profile with no coaching fields filled in yet.
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            tension_type: None,
            communication_style: None,
            focus_area: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One message in a user's chat history.
///
/// Role is `user` or `assistant`. Rows are append-only.
#[derive(Debug, Clone)]
pub struct ChatMessageRecord {
    pub id: Uuid,
    pub user_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
