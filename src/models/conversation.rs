use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::MessageRole;

/// A follow-up discussion thread anchored to one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Analysis this conversation discusses, if any.
    pub analysis_id: Option<Uuid>,
    pub started_at: NaiveDateTime,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: NaiveDateTime,
}

impl Conversation {
    pub fn new(analysis_id: Option<Uuid>, title: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            analysis_id,
            started_at: chrono::Local::now().naive_local(),
            title,
        }
    }
}

impl Message {
    pub fn new(conversation_id: Uuid, role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content,
            timestamp: chrono::Local::now().naive_local(),
        }
    }
}
