//! Domain services.
//!
//! Each service is a thin layer over [`ApiClient`](crate::api::ApiClient) or a
//! [`DocumentStore`](crate::store::DocumentStore): fixed paths, optional
//! client-side filtering, and a uniform [`ApiResponse`](crate::api::ApiResponse)
//! result whichever backend answered.

pub mod agents;
pub mod chat;
pub mod firestore;
pub mod tasks;

pub use agents::AgentsService;
pub use chat::{ChatService, ANONYMOUS_USER_ID};
pub use firestore::FirestoreService;
pub use tasks::TasksService;

use std::sync::Arc;

use crate::api::ApiClient;
use crate::store::DocumentStore;

/// All services, wired to one backend and one document store.
#[derive(Clone)]
pub struct Services {
    pub agents: AgentsService,
    pub tasks: TasksService,
    pub chat: ChatService,
    pub firestore: FirestoreService,
}

impl Services {
    /// Services over a configured document store. Signed-in users' tasks are
    /// read from it.
    pub fn new(api: ApiClient, store: Arc<dyn DocumentStore>) -> Self {
        let services = Self::offline(api, store);
        let tasks = services.tasks.clone().with_firestore(services.firestore.clone());
        Self { tasks, ..services }
    }

    /// Services whose `store` only holds profiles and starter agents. Tasks
    /// always come from the REST backend.
    pub fn offline(api: ApiClient, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            agents: AgentsService::new(api.clone()),
            tasks: TasksService::new(api.clone()),
            chat: ChatService::new(api),
            firestore: FirestoreService::new(store),
        }
    }
}

/// Percent-encode a single path segment (ids come from users and the backend).
pub(crate) fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}
