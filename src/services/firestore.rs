//! Per-user agents, tasks and profile kept in the document store.
//!
//! Layout:
//! - `users/{uid}`: [`UserProfile`]
//! - `users/{uid}/agents/{id}`: [`Agent`]
//! - `users/{uid}/tasks/{id}`: [`Task`]
//!
//! Store errors never escape: they are logged and returned as an
//! [`ApiResponse`] with status 500, the same envelope the REST services use.

use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::api::ApiResponse;
use crate::auth::AuthUser;
use crate::roster::default_agents;
use crate::store::{
    to_fields, Direction, Document, DocumentStore, FieldValue, Fields, Query, StoreError,
};
use crate::types::{Agent, AgentUpdate, NewTask, Task, TaskStatus, TaskUpdate, UserProfile, UserType};

const STATUS_OK: u16 = 200;
const STATUS_STORE_ERROR: u16 = 500;

pub const DEFAULT_RECENT_LIMIT: usize = 10;

fn profile_path(uid: &str) -> String {
    format!("users/{}", uid)
}

fn agents_collection(uid: &str) -> String {
    format!("users/{}/agents", uid)
}

fn tasks_collection(uid: &str) -> String {
    format!("users/{}/tasks", uid)
}

/// Fold a store result into an envelope, logging failures.
fn envelope<T>(result: Result<T, StoreError>, action: &str) -> ApiResponse<T> {
    match result {
        Ok(data) => ApiResponse::ok(data, STATUS_OK),
        Err(e) => {
            tracing::error!("Error {}: {}", action, e);
            ApiResponse::failure(e.to_string(), STATUS_STORE_ERROR)
        }
    }
}

/// Decode every document, skipping (and logging) the ones that don't fit `T`.
fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode() {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping malformed document: {}", e);
                None
            }
        })
        .collect()
}

/// Serialize `value` to store fields, dropping `id` (it lives in the path).
fn body_fields<T: serde::Serialize + ?Sized>(value: &T) -> Result<Fields, StoreError> {
    let mut fields = to_fields(value)?;
    fields.remove("id");
    Ok(fields)
}

#[derive(Clone)]
pub struct FirestoreService {
    store: Arc<dyn DocumentStore>,
}

impl FirestoreService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Use `id_token` for subsequent store calls.
    pub async fn set_credentials(&self, id_token: Option<String>) {
        self.store.set_credentials(id_token).await;
    }

    // ==================== Agents ====================

    pub async fn get_user_agents(&self, uid: &str) -> ApiResponse<Vec<Agent>> {
        let result = self
            .store
            .query(&agents_collection(uid), &Query::new())
            .await
            .map(decode_all);
        envelope(result, "fetching user agents")
    }

    pub async fn get_user_agent(&self, uid: &str, agent_id: &str) -> ApiResponse<Option<Agent>> {
        let path = format!("{}/{}", agents_collection(uid), agent_id);
        let result = match self.store.get(&path).await {
            Ok(Some(doc)) => doc.decode().map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        envelope(result, "fetching user agent")
    }

    /// Store `agent` for `uid`. A non-empty `agent.id` is used as the document
    /// id (writing the same agent twice overwrites it); an empty one gets a
    /// generated id.
    pub async fn create_user_agent(&self, uid: &str, agent: &Agent) -> ApiResponse<Agent> {
        envelope(self.write_agent(uid, agent).await, "creating user agent")
    }

    async fn write_agent(&self, uid: &str, agent: &Agent) -> Result<Agent, StoreError> {
        let mut fields = body_fields(agent)?;
        let now = FieldValue::now();
        fields.insert("created_at".to_string(), now.clone());
        fields.insert("updated_at".to_string(), now);

        let collection = agents_collection(uid);
        let id = if agent.id.is_empty() {
            self.store.add(&collection, fields).await?
        } else {
            self.store
                .set(&format!("{}/{}", collection, agent.id), fields, false)
                .await?;
            agent.id.clone()
        };

        Ok(Agent {
            id,
            ..agent.clone()
        })
    }

    pub async fn update_user_agent(
        &self,
        uid: &str,
        agent_id: &str,
        update: &AgentUpdate,
    ) -> ApiResponse<()> {
        let path = format!("{}/{}", agents_collection(uid), agent_id);
        envelope(self.stamped_update(&path, update).await, "updating user agent")
    }

    pub async fn delete_user_agent(&self, uid: &str, agent_id: &str) -> ApiResponse<()> {
        let path = format!("{}/{}", agents_collection(uid), agent_id);
        envelope(self.store.delete(&path).await, "deleting user agent")
    }

    // ==================== Tasks ====================

    /// All tasks of `uid`, newest first.
    pub async fn get_user_tasks(&self, uid: &str) -> ApiResponse<Vec<Task>> {
        let query = Query::new().order_by("created_at", Direction::Descending);
        envelope(self.query_tasks(uid, &query).await, "fetching user tasks")
    }

    pub async fn get_user_task(&self, uid: &str, task_id: &str) -> ApiResponse<Option<Task>> {
        let path = format!("{}/{}", tasks_collection(uid), task_id);
        let result = match self.store.get(&path).await {
            Ok(Some(doc)) => doc.decode().map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        envelope(result, "fetching user task")
    }

    pub async fn create_user_task(&self, uid: &str, task: &NewTask) -> ApiResponse<Task> {
        envelope(self.write_task(uid, task).await, "creating user task")
    }

    async fn write_task(&self, uid: &str, task: &NewTask) -> Result<Task, StoreError> {
        let mut fields = body_fields(task)?;
        let now = chrono::Utc::now();
        fields.insert("created_at".to_string(), FieldValue::Timestamp(now));
        fields.insert("updated_at".to_string(), FieldValue::Timestamp(now));

        let id = self.store.add(&tasks_collection(uid), fields).await?;
        tracing::debug!("Created task {} for user {}", id, uid);

        Ok(Task {
            id,
            description: task.description.clone(),
            assigned_agent_id: task.assigned_agent_id.clone(),
            status: task.status,
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    pub async fn update_user_task(
        &self,
        uid: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> ApiResponse<()> {
        let path = format!("{}/{}", tasks_collection(uid), task_id);
        envelope(self.stamped_update(&path, update).await, "updating user task")
    }

    pub async fn delete_user_task(&self, uid: &str, task_id: &str) -> ApiResponse<()> {
        let path = format!("{}/{}", tasks_collection(uid), task_id);
        envelope(self.store.delete(&path).await, "deleting user task")
    }

    pub async fn get_user_tasks_by_status(
        &self,
        uid: &str,
        status: TaskStatus,
    ) -> ApiResponse<Vec<Task>> {
        let query = Query::new()
            .filter_eq("status", FieldValue::from(status.as_str()))
            .order_by("created_at", Direction::Descending);
        envelope(self.query_tasks(uid, &query).await, "fetching user tasks by status")
    }

    pub async fn get_recent_user_tasks(&self, uid: &str, limit: usize) -> ApiResponse<Vec<Task>> {
        let query = Query::new()
            .order_by("created_at", Direction::Descending)
            .limit(limit);
        envelope(self.query_tasks(uid, &query).await, "fetching recent user tasks")
    }

    async fn query_tasks(&self, uid: &str, query: &Query) -> Result<Vec<Task>, StoreError> {
        let docs = self.store.query(&tasks_collection(uid), query).await?;
        Ok(decode_all(docs))
    }

    async fn stamped_update<T: serde::Serialize>(
        &self,
        path: &str,
        update: &T,
    ) -> Result<(), StoreError> {
        let mut fields = to_fields(update)?;
        fields.insert("updated_at".to_string(), FieldValue::now());
        self.store.update(path, fields).await
    }

    // ==================== Seeding ====================

    /// Write the starter roster for `user_type`. Agents are stored under their
    /// fixed ids, so running this again leaves exactly one copy of each.
    pub async fn initialize_default_agents(
        &self,
        uid: &str,
        user_type: UserType,
    ) -> ApiResponse<Vec<Agent>> {
        let mut created = Vec::new();
        for agent in default_agents(user_type) {
            match self.write_agent(uid, &agent).await {
                Ok(agent) => created.push(agent),
                Err(e) => return envelope(Err(e), "initializing default agents"),
            }
        }
        tracing::info!(
            "Initialized {} default agents for {} user {}",
            created.len(),
            user_type,
            uid
        );
        ApiResponse::ok(created, STATUS_OK)
    }

    // ==================== Profile ====================

    pub async fn get_user_profile(&self, uid: &str) -> ApiResponse<Option<UserProfile>> {
        let result = match self.store.get(&profile_path(uid)).await {
            Ok(Some(doc)) => doc.decode().map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        envelope(result, "fetching user profile")
    }

    /// Fetch the profile of `user`, creating it on first sign-in. An existing
    /// profile only has `lastLoginAt` refreshed.
    pub async fn ensure_user_profile(&self, user: &AuthUser) -> ApiResponse<UserProfile> {
        envelope(self.touch_profile(user).await, "provisioning user profile")
    }

    async fn touch_profile(&self, user: &AuthUser) -> Result<UserProfile, StoreError> {
        let path = profile_path(&user.uid);
        let now = chrono::Utc::now();

        if let Some(doc) = self.store.get(&path).await? {
            let mut touch = Fields::new();
            touch.insert("lastLoginAt".to_string(), FieldValue::Timestamp(now));
            self.store.set(&path, touch, true).await?;

            let mut profile: UserProfile = doc.decode()?;
            profile.last_login_at = Some(now);
            return Ok(profile);
        }

        let profile = UserProfile {
            uid: user.uid.clone(),
            email: user.email.clone().unwrap_or_default(),
            display_name: user.display_name.clone().unwrap_or_default(),
            photo_url: user.photo_url.clone(),
            created_at: Some(now),
            last_login_at: Some(now),
            user_type: None,
        };

        let mut fields = to_fields(&profile)?;
        fields.insert("createdAt".to_string(), FieldValue::Timestamp(now));
        fields.insert("lastLoginAt".to_string(), FieldValue::Timestamp(now));
        self.store.set(&path, fields, false).await?;
        tracing::info!("Created profile for user {}", user.uid);

        Ok(profile)
    }

    pub async fn set_user_type(&self, uid: &str, user_type: UserType) -> ApiResponse<()> {
        let mut fields = Fields::new();
        fields.insert("userType".to_string(), FieldValue::from(user_type.as_str()));
        let result = self.store.set(&profile_path(uid), fields, true).await;
        envelope(result, "saving user type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, FirestoreService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), FirestoreService::new(store))
    }

    fn user() -> AuthUser {
        AuthUser {
            uid: "u1".to_string(),
            email: Some("ada@example.com".to_string()),
            display_name: Some("Ada".to_string()),
            photo_url: None,
        }
    }

    fn new_task(description: &str, status: TaskStatus) -> NewTask {
        NewTask {
            description: description.to_string(),
            assigned_agent_id: None,
            status,
        }
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let (_, firestore) = service();

        let created = firestore
            .create_user_task("u1", &new_task("Draft memo", TaskStatus::Pending))
            .await;
        assert_eq!(created.status, 200);
        let task = created.data.unwrap();
        assert!(task.created_at_utc().is_some());

        let fetched = firestore.get_user_task("u1", &task.id).await.data.unwrap();
        assert_eq!(fetched, Some(task.clone()));

        let update = TaskUpdate {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        assert!(firestore.update_user_task("u1", &task.id, &update).await.is_success());
        let fetched = firestore.get_user_task("u1", &task.id).await.data.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert_eq!(fetched.created_at, task.created_at);

        assert!(firestore.delete_user_task("u1", &task.id).await.is_success());
        let missing = firestore.get_user_task("u1", &task.id).await;
        assert_eq!(missing.status, 200);
        assert_eq!(missing.data, Some(None));
    }

    #[tokio::test]
    async fn test_tasks_are_newest_first_and_filtered_by_status() {
        let (_, firestore) = service();
        for (description, status) in [
            ("first", TaskStatus::Pending),
            ("second", TaskStatus::Completed),
            ("third", TaskStatus::Pending),
        ] {
            firestore
                .create_user_task("u1", &new_task(description, status))
                .await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let all = firestore.get_user_tasks("u1").await.data.unwrap();
        let order: Vec<&str> = all.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(order, vec!["third", "second", "first"]);

        let pending = firestore
            .get_user_tasks_by_status("u1", TaskStatus::Pending)
            .await
            .data
            .unwrap();
        assert!(pending.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(pending.len(), 2);

        let recent = firestore.get_recent_user_tasks("u1", 1).await.data.unwrap();
        assert_eq!(recent[0].description, "third");
    }

    #[tokio::test]
    async fn test_update_missing_task_is_500() {
        let (_, firestore) = service();
        let resp = firestore
            .update_user_task("u1", "ghost", &TaskUpdate::default())
            .await;
        assert_eq!(resp.status, 500);
        assert!(resp.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_profile_created_once_and_touched_after() {
        let (_, firestore) = service();

        let first = firestore.ensure_user_profile(&user()).await.data.unwrap();
        assert_eq!(first.display_name, "Ada");
        let created_at = first.created_at.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        firestore.ensure_user_profile(&user()).await;

        let stored = firestore.get_user_profile("u1").await.data.unwrap().unwrap();
        assert_eq!(
            stored.created_at.unwrap().timestamp_millis(),
            created_at.timestamp_millis()
        );
        assert!(stored.last_login_at.unwrap() > created_at);
        assert_eq!(stored.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_set_user_type_merges() {
        let (_, firestore) = service();
        firestore.ensure_user_profile(&user()).await;
        assert!(firestore.set_user_type("u1", UserType::Tutor).await.is_success());

        let stored = firestore.get_user_profile("u1").await.data.unwrap().unwrap();
        assert_eq!(stored.user_type, Some(UserType::Tutor));
        assert_eq!(stored.display_name, "Ada");
    }

    #[tokio::test]
    async fn test_seeding_twice_does_not_duplicate() {
        let (store, firestore) = service();

        let seeded = firestore
            .initialize_default_agents("u1", UserType::Student)
            .await
            .data
            .unwrap();
        assert_eq!(seeded.len(), 3);
        firestore
            .initialize_default_agents("u1", UserType::Student)
            .await;

        assert_eq!(store.count("users/u1/agents").await, 3);
        let mut ids: Vec<String> = firestore
            .get_user_agents("u1")
            .await
            .data
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["research-assistant", "study-secretary", "tutor-manager"]);
    }

    #[tokio::test]
    async fn test_agent_update_and_delete() {
        let (_, firestore) = service();
        firestore
            .initialize_default_agents("u1", UserType::Designer)
            .await;

        let update = AgentUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(firestore
            .update_user_agent("u1", "asset-manager", &update)
            .await
            .is_success());
        let agent = firestore
            .get_user_agent("u1", "asset-manager")
            .await
            .data
            .unwrap()
            .unwrap();
        assert!(!agent.is_active);
        assert_eq!(agent.name, "Asset Manager");

        firestore.delete_user_agent("u1", "asset-manager").await;
        assert_eq!(firestore.get_user_agents("u1").await.data.unwrap().len(), 2);
    }
}
