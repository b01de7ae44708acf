//! Tasks (REST `/tasks`, or the user's task collection when signed in).

use serde_json::json;

use super::firestore::{FirestoreService, DEFAULT_RECENT_LIMIT};
use super::segment;
use crate::api::{ApiClient, ApiResponse};
use crate::types::{CreateTaskRequest, Task, TaskStats, TaskStatus, TaskUpdate};

#[derive(Clone)]
pub struct TasksService {
    api: ApiClient,
    firestore: Option<FirestoreService>,
    user_id: Option<String>,
}

impl TasksService {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            firestore: None,
            user_id: None,
        }
    }

    /// Read signed-in users' tasks from the document store instead of REST.
    pub fn with_firestore(mut self, firestore: FirestoreService) -> Self {
        self.firestore = Some(firestore);
        self
    }

    /// A copy of this service whose filter methods read `user_id`'s tasks.
    pub fn for_user(&self, user_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.map(str::to_string),
            ..self.clone()
        }
    }

    /// Tasks of `user_id` from the document store when one is configured,
    /// otherwise GET /tasks. Malformed rows are skipped on either path.
    pub async fn get_tasks(&self, user_id: Option<&str>) -> ApiResponse<Vec<Task>> {
        match (user_id, &self.firestore) {
            (Some(uid), Some(firestore)) => firestore.get_user_tasks(uid).await,
            _ => self
                .api
                .get::<Vec<serde_json::Value>>("/tasks")
                .await
                .map(decode_rows),
        }
    }

    /// GET /tasks/:id
    pub async fn get_task(&self, task_id: &str) -> ApiResponse<Task> {
        self.api.get(&format!("/tasks/{}", segment(task_id))).await
    }

    /// POST /tasks
    pub async fn create_task(&self, task: &CreateTaskRequest) -> ApiResponse<Task> {
        self.api.post("/tasks", task).await
    }

    /// PUT /tasks/:id
    pub async fn update_task(&self, task_id: &str, update: &TaskUpdate) -> ApiResponse<Task> {
        self.api
            .put(&format!("/tasks/{}", segment(task_id)), update)
            .await
    }

    /// DELETE /tasks/:id
    pub async fn delete_task(&self, task_id: &str) -> ApiResponse<()> {
        self.api.delete(&format!("/tasks/{}", segment(task_id))).await
    }

    pub async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> ApiResponse<Task> {
        self.api
            .patch(
                &format!("/tasks/{}", segment(task_id)),
                &json!({ "status": status }),
            )
            .await
    }

    pub async fn assign_task(&self, task_id: &str, agent_id: &str) -> ApiResponse<Task> {
        self.api
            .patch(
                &format!("/tasks/{}", segment(task_id)),
                &json!({ "assigned_agent_id": agent_id }),
            )
            .await
    }

    async fn scoped_tasks(&self) -> ApiResponse<Vec<Task>> {
        self.get_tasks(self.user_id.as_deref()).await
    }

    pub async fn get_tasks_by_status(&self, status: TaskStatus) -> ApiResponse<Vec<Task>> {
        self.scoped_tasks()
            .await
            .map(|tasks| tasks_with_status(tasks, status))
    }

    pub async fn get_pending_tasks(&self) -> ApiResponse<Vec<Task>> {
        self.get_tasks_by_status(TaskStatus::Pending).await
    }

    pub async fn get_completed_tasks(&self) -> ApiResponse<Vec<Task>> {
        self.get_tasks_by_status(TaskStatus::Completed).await
    }

    pub async fn get_tasks_by_agent(&self, agent_id: &str) -> ApiResponse<Vec<Task>> {
        self.scoped_tasks()
            .await
            .map(|tasks| tasks_for_agent(tasks, agent_id))
    }

    /// Newest `limit` tasks (10 when `None`).
    pub async fn get_recent_tasks(&self, limit: Option<usize>) -> ApiResponse<Vec<Task>> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT);
        self.scoped_tasks()
            .await
            .map(|tasks| most_recent(tasks, limit))
    }

    pub async fn get_task_stats(&self) -> ApiResponse<TaskStats> {
        self.scoped_tasks()
            .await
            .map(|tasks| TaskStats::from_tasks(&tasks))
    }
}

fn decode_rows(rows: Vec<serde_json::Value>) -> Vec<Task> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<Task>(row) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!("Skipping malformed task: {}", e);
                None
            }
        })
        .collect()
}

pub fn tasks_with_status(tasks: Vec<Task>, status: TaskStatus) -> Vec<Task> {
    tasks.into_iter().filter(|t| t.status == status).collect()
}

pub fn tasks_for_agent(tasks: Vec<Task>, agent_id: &str) -> Vec<Task> {
    tasks
        .into_iter()
        .filter(|t| t.assigned_agent_id.as_deref() == Some(agent_id))
        .collect()
}

/// Sort newest first and keep `limit`. Unparseable timestamps sort last;
/// ties keep their original order.
pub fn most_recent(mut tasks: Vec<Task>, limit: usize) -> Vec<Task> {
    tasks.sort_by_key(|t| std::cmp::Reverse(t.created_at_utc()));
    tasks.truncate(limit);
    tasks
}
