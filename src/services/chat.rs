//! Chat with the executive secretary (REST `/chat`).
//!
//! Only `POST /chat` is guaranteed to exist server-side. History, help,
//! direct messages, suggestions and intent analysis may be missing; their
//! failures come back as ordinary envelopes.

use serde::Serialize;
use serde_json::json;

use super::segment;
use crate::api::{ApiClient, ApiResponse};
use crate::types::{
    AgentSuggestions, ChatContext, ChatHelp, ChatMessage, ChatResponse, MessageIntent,
};

/// User id sent when nobody is signed in.
pub const ANONYMOUS_USER_ID: &str = "user-123";

#[derive(Serialize)]
struct ContextualMessage<'a> {
    message: &'a str,
    user_id: &'a str,
    context: &'a ChatContext,
}

#[derive(Serialize)]
struct DirectMessage<'a> {
    message: &'a str,
    target_agent_id: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct ChatService {
    api: ApiClient,
}

impl ChatService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// POST /chat
    pub async fn send_message(&self, message: &str, user_id: &str) -> ApiResponse<ChatResponse> {
        let body = ChatMessage {
            message: message.to_string(),
            user_id: user_id.to_string(),
        };
        self.api.post("/chat", &body).await
    }

    pub async fn send_message_with_context(
        &self,
        message: &str,
        user_id: &str,
        context: &ChatContext,
    ) -> ApiResponse<ChatResponse> {
        let body = ContextualMessage {
            message,
            user_id,
            context,
        };
        self.api.post("/chat", &body).await
    }

    /// Messages the user has sent, oldest first.
    pub async fn get_chat_history(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> ApiResponse<Vec<ChatMessage>> {
        let mut path = format!("/chat/history/{}", segment(user_id));
        if let Some(limit) = limit {
            path.push_str(&format!("?limit={}", limit));
        }
        self.api.get(&path).await
    }

    pub async fn clear_chat_history(&self, user_id: &str) -> ApiResponse<()> {
        self.api
            .delete(&format!("/chat/history/{}", segment(user_id)))
            .await
    }

    pub async fn get_chat_help(&self) -> ApiResponse<ChatHelp> {
        self.api.get("/chat/help").await
    }

    /// Bypass the secretary and address `agent_id` directly.
    pub async fn send_message_to_agent(
        &self,
        message: &str,
        agent_id: &str,
        user_id: &str,
    ) -> ApiResponse<ChatResponse> {
        let body = DirectMessage {
            message,
            target_agent_id: agent_id,
            user_id,
        };
        self.api.post("/chat/direct", &body).await
    }

    pub async fn get_agent_suggestions(&self, message: &str) -> ApiResponse<AgentSuggestions> {
        self.api
            .post("/chat/suggest-agents", &json!({ "message": message }))
            .await
    }

    pub async fn analyze_message_intent(&self, message: &str) -> ApiResponse<MessageIntent> {
        self.api
            .post("/chat/analyze", &json!({ "message": message }))
            .await
    }
}
