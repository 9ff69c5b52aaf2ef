//! Follow-up conversation over a completed analysis.
//!
//! Each conversation is anchored to one stored analysis; the model
//! answers questions grounded in that analysis record (report, metrics,
//! detected text) plus the last few turns of the discussion.

use chrono::Local;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::{AnalysisRecord, Conversation, Message, MessageRole};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub const CHAT_SYSTEM_PROMPT: &str = r#"You are a medical imaging assistant answering follow-up questions about one automated image analysis. You are NOT a doctor and you do NOT diagnose.

ABSOLUTE RULES — NO EXCEPTIONS:
1. Ground every statement in the analysis record provided below.
2. NEVER diagnose, stage, or rule out any condition.
3. NEVER recommend treatments or medications.
4. If the question cannot be answered from the analysis record, say so clearly.
5. Use plain language. Explain technical terms when they come up.
6. When a question needs clinical judgment, suggest discussing it with a healthcare provider."#;

/// How many prior turns to replay into the prompt.
const HISTORY_WINDOW: usize = 4;

/// Build the model prompt for one follow-up question.
pub fn build_followup_prompt(
    question: &str,
    analysis: Option<&AnalysisRecord>,
    history: &[Message],
) -> String {
    let mut prompt = String::new();

    if let Some(rec) = analysis {
        prompt.push_str("<ANALYSIS_RECORD>\n");
        prompt.push_str(&format!("Upload type: {}\n", rec.upload_kind.as_str()));
        prompt.push_str(&format!(
            "Quality: brightness {:.2}, contrast {:.2}, sharpness {:.1}, noise {:.1}\n",
            rec.metrics.brightness, rec.metrics.contrast, rec.metrics.sharpness, rec.metrics.noise
        ));
        if !rec.issues.is_empty() {
            prompt.push_str(&format!("Quality issues: {}\n", rec.issues.join(", ")));
        }
        if !rec.detected_text.is_empty() {
            prompt.push_str(&format!("Text found in image: {}\n", rec.detected_text));
        }
        if !rec.labels.is_empty() {
            prompt.push_str(&format!("Content labels: {}\n", rec.labels.join("; ")));
        }
        prompt.push_str(&format!("\nReport:\n{}\n", rec.report));
        prompt.push_str("</ANALYSIS_RECORD>\n\n");
    }

    let recent: Vec<_> = history.iter().rev().take(HISTORY_WINDOW).rev().collect();
    if !recent.is_empty() {
        prompt.push_str("<CONVERSATION_HISTORY>\n");
        for msg in recent {
            let role = match msg.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", role, msg.content));
        }
        prompt.push_str("</CONVERSATION_HISTORY>\n\n");
    }

    prompt.push_str(&format!("User question: {question}\n\n"));
    prompt.push_str("Answer based ONLY on the analysis record above.");

    prompt
}

/// Response when a conversation has no surviving analysis to ground on.
pub fn no_analysis_response() -> String {
    "I don't have an analysis to reference for this conversation. Upload an image \
for analysis first, and I'll be able to answer questions about what was found."
        .to_string()
}

/// Manages conversation lifecycle and message persistence.
pub struct ConversationManager<'a> {
    conn: &'a Connection,
}

impl<'a> ConversationManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Start a new conversation anchored to an analysis. Returns the ID.
    pub fn start(&self, analysis_id: Option<Uuid>, title: Option<&str>) -> Result<Uuid, ChatError> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            analysis_id,
            started_at: Local::now().naive_local(),
            title: title.map(|t| t.to_string()),
        };
        repository::insert_conversation(self.conn, &conversation)?;
        Ok(conversation.id)
    }

    /// Add a user message to an existing conversation.
    pub fn add_user_message(&self, conversation_id: Uuid, text: &str) -> Result<Uuid, ChatError> {
        self.ensure_conversation_exists(conversation_id)?;
        let msg = Message::new(conversation_id, MessageRole::User, text.to_string());
        repository::insert_message(self.conn, &msg)?;
        Ok(msg.id)
    }

    /// Add an assistant response.
    pub fn add_response(&self, conversation_id: Uuid, text: &str) -> Result<Uuid, ChatError> {
        self.ensure_conversation_exists(conversation_id)?;
        let msg = Message::new(conversation_id, MessageRole::Assistant, text.to_string());
        repository::insert_message(self.conn, &msg)?;
        Ok(msg.id)
    }

    /// Get all messages for a conversation (ordered by timestamp).
    pub fn history(&self, conversation_id: Uuid) -> Result<Vec<Message>, ChatError> {
        self.ensure_conversation_exists(conversation_id)?;
        Ok(repository::get_messages_by_conversation(
            self.conn,
            &conversation_id,
        )?)
    }

    /// The analysis this conversation discusses, if any.
    pub fn analysis(&self, conversation_id: Uuid) -> Result<Option<AnalysisRecord>, ChatError> {
        self.ensure_conversation_exists(conversation_id)?;
        Ok(repository::get_analysis_for_conversation(
            self.conn,
            &conversation_id,
        )?)
    }

    fn ensure_conversation_exists(&self, id: Uuid) -> Result<(), ChatError> {
        let conv = repository::get_conversation(self.conn, &id)?;
        if conv.is_none() {
            return Err(ChatError::ConversationNotFound(id));
        }
        Ok(())
    }
}
