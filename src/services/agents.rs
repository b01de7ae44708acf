//! Agents in the user's workforce (REST `/agents`).

use serde_json::json;

use super::segment;
use crate::api::{ApiClient, ApiResponse};
use crate::types::{Agent, AgentRole, AgentUpdate, CreateAgentRequest};

#[derive(Debug, Clone)]
pub struct AgentsService {
    api: ApiClient,
}

impl AgentsService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// GET /agents
    pub async fn get_agents(&self) -> ApiResponse<Vec<Agent>> {
        self.api.get("/agents").await
    }

    /// GET /agents/:id
    pub async fn get_agent(&self, agent_id: &str) -> ApiResponse<Agent> {
        self.api.get(&format!("/agents/{}", segment(agent_id))).await
    }

    /// POST /agents
    pub async fn create_agent(&self, agent: &CreateAgentRequest) -> ApiResponse<Agent> {
        self.api.post("/agents", agent).await
    }

    /// PUT /agents/:id
    pub async fn update_agent(&self, agent_id: &str, update: &AgentUpdate) -> ApiResponse<Agent> {
        self.api
            .put(&format!("/agents/{}", segment(agent_id)), update)
            .await
    }

    /// DELETE /agents/:id
    pub async fn delete_agent(&self, agent_id: &str) -> ApiResponse<()> {
        self.api
            .delete(&format!("/agents/{}", segment(agent_id)))
            .await
    }

    /// PATCH /agents/:id with `{is_active}`.
    pub async fn toggle_agent_status(&self, agent_id: &str, is_active: bool) -> ApiResponse<Agent> {
        self.api
            .patch(
                &format!("/agents/{}", segment(agent_id)),
                &json!({ "is_active": is_active }),
            )
            .await
    }

    pub async fn get_active_agents(&self) -> ApiResponse<Vec<Agent>> {
        self.get_agents().await.map(active_agents)
    }

    pub async fn get_agents_by_role(&self, role: &AgentRole) -> ApiResponse<Vec<Agent>> {
        self.get_agents()
            .await
            .map(|agents| agents_with_role(agents, role))
    }

    /// First active agent offering at least one of `capabilities`.
    pub async fn find_agent_by_capabilities(
        &self,
        capabilities: &[String],
    ) -> ApiResponse<Option<Agent>> {
        self.get_agents()
            .await
            .map(|agents| first_with_capabilities(agents, capabilities))
    }
}

pub fn active_agents(agents: Vec<Agent>) -> Vec<Agent> {
    agents.into_iter().filter(|a| a.is_active).collect()
}

pub fn agents_with_role(agents: Vec<Agent>, role: &AgentRole) -> Vec<Agent> {
    agents.into_iter().filter(|a| &a.role == role).collect()
}

pub fn first_with_capabilities(agents: Vec<Agent>, capabilities: &[String]) -> Option<Agent> {
    agents
        .into_iter()
        .find(|a| a.is_active && a.has_any_capability(capabilities))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockBackend;
    use axum::extract::Path;
    use axum::routing::{get, patch};
    use axum::{Json, Router};
    use serde_json::Value;

    fn roster() -> Vec<Agent> {
        serde_json::from_value(json!([
            {"id": "sec", "name": "Executive Secretary", "role": "secretary",
             "capabilities": ["task_delegation", "communication"], "is_active": true},
            {"id": "hm", "name": "Hiring Manager", "role": "hiring_manager",
             "capabilities": ["agent_creation"], "is_active": false},
            {"id": "da", "name": "Data Analyst", "role": "data_analyst",
             "capabilities": ["analysis", "reporting"], "is_active": true},
            {"id": "da2", "name": "Backup Analyst", "role": "data_analyst",
             "capabilities": ["analysis"], "is_active": false}
        ]))
        .unwrap()
    }

    #[test]
    fn test_active_filter_only_keeps_active() {
        let active = active_agents(roster());
        assert!(!active.is_empty());
        assert!(active.iter().all(|a| a.is_active));
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn test_role_filter() {
        let analysts = agents_with_role(roster(), &AgentRole::DataAnalyst);
        assert_eq!(analysts.len(), 2);
        assert!(analysts.iter().all(|a| a.role == AgentRole::DataAnalyst));
    }

    #[test]
    fn test_capability_lookup_skips_inactive() {
        let caps = vec!["agent_creation".to_string()];
        assert!(first_with_capabilities(roster(), &caps).is_none());

        let caps = vec!["reporting".to_string(), "unknown".to_string()];
        assert_eq!(first_with_capabilities(roster(), &caps).unwrap().id, "da");
    }

    #[tokio::test]
    async fn test_active_agents_over_http() {
        let body = serde_json::to_value(roster()).unwrap();
        let router = Router::new().route("/agents", get(move || async move { Json(body) }));
        let backend = MockBackend::start(router).await;
        let service = AgentsService::new(ApiClient::new(&backend.url()));

        let resp = service.get_active_agents().await;
        assert_eq!(resp.status, 200);
        let ids: Vec<String> = resp.data.unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["sec", "da"]);
    }

    #[tokio::test]
    async fn test_filter_passes_errors_through() {
        let url = MockBackend::unreachable_url().await;
        let service = AgentsService::new(ApiClient::new(&url));

        let resp = service.get_agents_by_role(&AgentRole::Secretary).await;
        assert!(resp.data.is_none());
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_toggle_sends_patch_body() {
        let router = Router::new().route(
            "/agents/:id",
            patch(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({
                    "id": id,
                    "name": "Hiring Manager",
                    "role": "hiring_manager",
                    "capabilities": [],
                    "is_active": body["is_active"]
                }))
            }),
        );
        let backend = MockBackend::start(router).await;
        let service = AgentsService::new(ApiClient::new(&backend.url()));

        let resp = service.toggle_agent_status("hm", true).await;
        let agent = resp.data.unwrap();
        assert_eq!(agent.id, "hm");
        assert!(agent.is_active);
    }
}
