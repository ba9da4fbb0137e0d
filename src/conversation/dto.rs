use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::meals::{MealType, PendingMeal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// `local -> analyzing -> analyzed -> saved`, or back to `local` when an
/// analysis fails. `failed` only marks assistant error notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Local,
    Analyzing,
    Analyzed,
    Saved,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type_hint: Option<MealType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_meal: Option<PendingMeal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_meal_id: Option<i64>,
    /// A create call for this message is in flight.
    pub saving: bool,
    #[serde(skip)]
    pub(crate) token: u64,
}

impl ConversationMessage {
    pub(crate) fn new(role: Role, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            status,
            meal_type_hint: None,
            pending_meal: None,
            saved_meal_id: None,
            saving: false,
            token: 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.status == MessageStatus::Analyzing || self.saving
    }
}

/// What goes back into the input box after a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerDraft {
    pub text: String,
    pub meal_type_hint: Option<MealType>,
}

/// Whether a finished request changed the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// Target message was retried or re-dispatched meanwhile.
    Discarded,
}
