//! Chat endpoints: follow-up questions over a stored analysis.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::types::ApiContext;
use crate::api::ApiError;
use crate::chat::{
    build_followup_prompt, no_analysis_response, ConversationManager, CHAT_SYSTEM_PROMPT,
};
use crate::db::repository::{self, ConversationSummary};
use crate::models::{AnalysisRecord, Conversation, Message};

pub const CHAT_DISCLAIMER: &str =
    "This assistant describes automated analysis results and does not provide medical advice.";

/// Upper bound on a single question, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Deserialize)]
pub struct SendRequest {
    pub conversation_id: Option<Uuid>,
    pub message: String,
}

#[derive(Serialize)]
pub struct SendResponse {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub response: String,
    pub disclaimer: &'static str,
}

/// POST /api/chat/send
pub async fn send(
    State(ctx): State<ApiContext>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(req) = payload?;
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty".into()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }

    // Record the question and collect grounding before any model call,
    // so the lock is released while the model runs.
    let (conversation_id, analysis, history) = {
        let conn = ctx.lock_db()?;
        let manager = ConversationManager::new(&conn);

        let conversation_id = match req.conversation_id {
            Some(id) => id,
            None => manager.start(None, None)?,
        };

        let history = manager.history(conversation_id)?;
        let analysis = manager.analysis(conversation_id)?;
        manager.add_user_message(conversation_id, message)?;

        (conversation_id, analysis, history)
    };

    let response_text = match &analysis {
        Some(record) => {
            let prompt = build_followup_prompt(message, Some(record), &history);
            ctx.generator.generate(CHAT_SYSTEM_PROMPT, &prompt).await?
        }
        None => no_analysis_response(),
    };

    let message_id = {
        let conn = ctx.lock_db()?;
        ConversationManager::new(&conn).add_response(conversation_id, &response_text)?
    };

    Ok(Json(SendResponse {
        conversation_id,
        message_id,
        response: response_text,
        disclaimer: CHAT_DISCLAIMER,
    }))
}

#[derive(Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// GET /api/chat/conversations
pub async fn conversations(
    State(ctx): State<ApiContext>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let conn = ctx.lock_db()?;
    let conversations = repository::list_conversations(&conn)?;
    Ok(Json(ConversationsResponse { conversations }))
}

#[derive(Serialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub analysis: Option<AnalysisRecord>,
}

/// GET /api/chat/conversations/:id
pub async fn conversation(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conn = ctx.lock_db()?;

    let conversation = repository::get_conversation(&conn, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("Conversation not found: {id}")))?;
    let messages = repository::get_messages_by_conversation(&conn, &id)?;
    let analysis = repository::get_analysis_for_conversation(&conn, &id)?;

    Ok(Json(ConversationResponse {
        conversation,
        messages,
        analysis,
    }))
}
