//! A chat session with the executive secretary.
//!
//! Holds the transcript and guards against overlapping sends. Backend failures
//! never escape as errors: they become a single apology entry in the transcript.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::ChatService;
use crate::types::ChatResponse;

pub const SECRETARY_NAME: &str = "Executive Secretary";
pub const SYSTEM_AGENT_NAME: &str = "System";

pub const GREETING: &str = "Hello! I'm your AI Secretary. I can help you manage tasks, delegate work to specialized agents, and coordinate your AI workforce. What would you like to accomplish today?";

pub const CONNECTIVITY_FAILURE_MESSAGE: &str = "I'm sorry, I'm having trouble connecting to the AI agents. Please make sure the backend server is running and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub agent_name: Option<String>,
    pub action_taken: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    fn user(text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            sender: Sender::User,
            agent_name: None,
            action_taken: None,
            timestamp: Utc::now(),
        }
    }

    fn agent(text: &str, agent_name: &str, action_taken: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            sender: Sender::Agent,
            agent_name: Some(agent_name.to_string()),
            action_taken,
            timestamp: Utc::now(),
        }
    }
}

/// What happened to a call to [`ChatSession::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Replied(ChatResponse),
    /// The backend could not be reached or answered with an error.
    Failed(String),
    /// Blank input, or another send was still in flight.
    Ignored,
    Cancelled,
}

/// Callback run after the secretary reports creating a task.
pub type TaskCreatedHook = Arc<dyn Fn() + Send + Sync>;

/// Clears the loading flag however the send ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ChatSession {
    chat: ChatService,
    transcript: RwLock<Vec<TranscriptEntry>>,
    loading: AtomicBool,
    on_task_created: Option<TaskCreatedHook>,
}

impl ChatSession {
    /// New session, opened by the secretary's greeting.
    pub fn new(chat: ChatService) -> Self {
        Self {
            chat,
            transcript: RwLock::new(vec![TranscriptEntry::agent(
                GREETING,
                SECRETARY_NAME,
                None,
            )]),
            loading: AtomicBool::new(false),
            on_task_created: None,
        }
    }

    pub fn on_task_created(mut self, hook: TaskCreatedHook) -> Self {
        self.on_task_created = Some(hook);
        self
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.read().await.clone()
    }

    pub async fn send(&self, input: &str, user_id: &str) -> SendOutcome {
        self.send_with_cancel(input, user_id, &CancellationToken::new())
            .await
    }

    /// Send `input` as `user_id`. Cancelling `cancel` abandons the request:
    /// nothing further is appended and the session is free again.
    pub async fn send_with_cancel(
        &self,
        input: &str,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        if input.trim().is_empty() {
            return SendOutcome::Ignored;
        }
        if self
            .loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Chat send ignored: a request is already in flight");
            return SendOutcome::Ignored;
        }
        let _guard = LoadingGuard(&self.loading);

        self.transcript
            .write()
            .await
            .push(TranscriptEntry::user(input));

        let resp = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Chat send cancelled");
                return SendOutcome::Cancelled;
            }
            resp = self.chat.send_message(input, user_id) => resp,
        };

        match (resp.data, resp.error) {
            (Some(reply), None) => {
                self.transcript.write().await.push(TranscriptEntry::agent(
                    &reply.response,
                    &reply.agent_name,
                    reply.action_taken.clone(),
                ));

                let created_task = reply
                    .action_taken
                    .as_deref()
                    .is_some_and(|action| action.contains("task"));
                if created_task {
                    if let Some(hook) = &self.on_task_created {
                        hook();
                    }
                }
                SendOutcome::Replied(reply)
            }
            (_, error) => {
                let error = error.unwrap_or_else(|| format!("empty reply (status {})", resp.status));
                tracing::error!("Error sending message: {}", error);
                self.transcript.write().await.push(TranscriptEntry::agent(
                    CONNECTIVITY_FAILURE_MESSAGE,
                    SYSTEM_AGENT_NAME,
                    None,
                ));
                SendOutcome::Failed(error)
            }
        }
    }
}
