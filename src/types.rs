//! Shared shapes exchanged with the workforce backend and the document store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Category of an agent.
///
/// Known categories get their own variant; anything else the backend sends is
/// kept verbatim in `Custom` so it round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentRole {
    Secretary,
    HiringManager,
    DataAnalyst,
    Researcher,
    ContentCreator,
    AgentBuilder,
    Consultant,
    Assistant,
    Creator,
    Manager,
    Custom(String),
}

impl AgentRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Secretary => "secretary",
            Self::HiringManager => "hiring_manager",
            Self::DataAnalyst => "data_analyst",
            Self::Researcher => "researcher",
            Self::ContentCreator => "content_creator",
            Self::AgentBuilder => "agent_builder",
            Self::Consultant => "consultant",
            Self::Assistant => "assistant",
            Self::Creator => "creator",
            Self::Manager => "manager",
            Self::Custom(s) => s,
        }
    }
}

impl From<String> for AgentRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "secretary" => Self::Secretary,
            "hiring_manager" => Self::HiringManager,
            "data_analyst" => Self::DataAnalyst,
            "researcher" => Self::Researcher,
            "content_creator" => Self::ContentCreator,
            "agent_builder" => Self::AgentBuilder,
            "consultant" => Self::Consultant,
            "assistant" => Self::Assistant,
            "creator" => Self::Creator,
            "manager" => Self::Manager,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for AgentRole {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<AgentRole> for String {
    fn from(role: AgentRole) -> Self {
        match role {
            AgentRole::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("task status", s))
    }
}

/// Role the user picked after first sign-in. Selects the starter roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Ceo,
    Student,
    Tutor,
    Designer,
    ContentCreator,
}

impl UserType {
    pub const ALL: [UserType; 5] = [
        UserType::Ceo,
        UserType::Student,
        UserType::Tutor,
        UserType::Designer,
        UserType::ContentCreator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ceo => "ceo",
            Self::Student => "student",
            Self::Tutor => "tutor",
            Self::Designer => "designer",
            Self::ContentCreator => "content_creator",
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("user type", s))
    }
}

/// Returned when a string names no known variant of a closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// An agent in the user's workforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl Agent {
    pub fn has_any_capability(&self, capabilities: &[String]) -> bool {
        capabilities.iter().any(|c| self.capabilities.contains(c))
    }
}

/// A unit of delegated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    /// Advisory reference to `Agent::id`; never validated client-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<String>,
    pub status: TaskStatus,
    /// ISO-8601 creation time.
    pub created_at: String,
}

impl Task {
    /// Parsed creation time, if the backend sent something we can read.
    ///
    /// Accepts RFC 3339 as well as naive `YYYY-MM-DDTHH:MM:SS[.f]` (treated as UTC).
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Outgoing chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    pub user_id: String,
}

/// Reply from the secretary (or whichever agent answered).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_taken: Option<String>,
}

/// Extra hints attached to a chat turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    #[serde(rename = "previousMessages", skip_serializing_if = "Option::is_none")]
    pub previous_messages: Option<u32>,
    #[serde(rename = "taskContext", skip_serializing_if = "Option::is_none")]
    pub task_context: Option<String>,
    #[serde(rename = "agentPreference", skip_serializing_if = "Option::is_none")]
    pub agent_preference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHelp {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSuggestions {
    #[serde(default)]
    pub suggested_agents: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageIntent {
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAgentRequest {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub id: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    pub created_at: String,
}

/// Partial agent update; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<AgentRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Partial task update; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

/// Task body for document-store creation (id and timestamp are assigned by the store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<String>,
    pub status: TaskStatus,
}

/// Counts per task status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let count = |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count();
        Self {
            total: tasks.len(),
            pending: count(TaskStatus::Pending),
            in_progress: count(TaskStatus::InProgress),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
        }
    }
}

/// Profile document stored at `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastLoginAt", default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(rename = "userType", default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,
}
