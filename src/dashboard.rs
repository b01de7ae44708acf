//! Workforce overview: agents and tasks fetched side by side.

use std::fmt;

use crate::api::ApiResponse;
use crate::services::agents::active_agents;
use crate::services::tasks::tasks_with_status;
use crate::services::{AgentsService, TasksService};
use crate::types::{Agent, Task, TaskStats, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dashboard {
    pub agents: Vec<Agent>,
    pub active_agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    pub pending_tasks: Vec<Task>,
    pub stats: TaskStats,
}

fn or_empty<T>(resp: ApiResponse<Vec<T>>, what: &str) -> Vec<T> {
    if let Some(error) = &resp.error {
        tracing::error!("Error fetching {}: {}", what, error);
    }
    resp.data.unwrap_or_default()
}

impl Dashboard {
    /// Fetch agents and `user_id`'s tasks concurrently. A failed fetch is
    /// logged and leaves its lists empty.
    pub async fn load(agents: &AgentsService, tasks: &TasksService, user_id: Option<&str>) -> Self {
        let (agents_resp, tasks_resp) = futures::join!(agents.get_agents(), tasks.get_tasks(user_id));
        Self::from_parts(or_empty(agents_resp, "agents"), or_empty(tasks_resp, "tasks"))
    }

    pub fn from_parts(agents: Vec<Agent>, tasks: Vec<Task>) -> Self {
        Self {
            active_agents: active_agents(agents.clone()),
            pending_tasks: tasks_with_status(tasks.clone(), TaskStatus::Pending),
            stats: TaskStats::from_tasks(&tasks),
            agents,
            tasks,
        }
    }
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Agents: {} ({} active)",
            self.agents.len(),
            self.active_agents.len()
        )?;
        for agent in &self.active_agents {
            writeln!(f, "  - {} [{}]", agent.name, agent.role)?;
        }
        writeln!(
            f,
            "Tasks: {} total, {} pending, {} in progress, {} completed, {} failed",
            self.stats.total,
            self.stats.pending,
            self.stats.in_progress,
            self.stats.completed,
            self.stats.failed
        )?;
        for task in &self.pending_tasks {
            writeln!(f, "  - {} ({})", task.description, task.id)?;
        }
        Ok(())
    }
}
