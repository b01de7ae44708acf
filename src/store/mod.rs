//! Document store access.
//!
//! The workforce keeps per-user data in a hierarchical document store:
//! - `users/{uid}`: the profile document
//! - `users/{uid}/agents/{agentId}`: the user's agents
//! - `users/{uid}/tasks/{taskId}`: the user's tasks
//!
//! [`DocumentStore`] abstracts the backend. [`FirestoreStore`] talks to the
//! Firestore REST API; [`MemoryStore`] keeps everything in process.

mod firestore;
mod memory;
mod value;

pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::MemoryStore;
pub use value::{to_fields, FieldValue, Fields};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Errors raised by a document store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("document store error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid document path: {0}")]
    InvalidPath(String),

    #[error("failed to decode document: {0}")]
    Decode(String),

    #[error("local store file: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored document: its id (last path segment) and its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// Decode into `T`, exposing the document id as an `id` field.
    ///
    /// Timestamps become ISO-8601 strings, so a `Task` read from the store has
    /// the same shape as one read from the REST backend.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut object = serde_json::Map::new();
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.to_json());
        }
        object.insert("id".to_string(), serde_json::Value::String(self.id.clone()));

        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| StoreError::Decode(format!("{} ({})", e, self.id)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Structured collection query: equality filters, one ordering, optional limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, FieldValue)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Backend-agnostic document store.
///
/// Paths are slash-separated (`users/u1/tasks/t1`). Document paths have an even
/// number of segments, collection paths an odd number.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` if it does not exist.
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document. With `merge`, only the given fields are replaced and
    /// the document is created if missing; without it the whole document is replaced.
    async fn set(&self, path: &str, fields: Fields, merge: bool) -> Result<(), StoreError>;

    /// Create a document with a generated id in `collection`. Returns the id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Update fields of an existing document. Fails with `NotFound` if absent.
    async fn update(&self, path: &str, fields: Fields) -> Result<(), StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Run `query` over the direct children of `collection`.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Swap the credentials used for subsequent calls (the signed-in user's ID token).
    async fn set_credentials(&self, _id_token: Option<String>) {}
}

/// Split a document path into its parent collection path and document id.
pub(crate) fn split_document_path(path: &str) -> Result<(&str, &str), StoreError> {
    let trimmed = path.trim_matches('/');
    let segments = trimmed.split('/').count();
    if trimmed.is_empty() || segments % 2 != 0 || trimmed.split('/').any(str::is_empty) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    match trimmed.rsplit_once('/') {
        Some((parent, id)) => Ok((parent, id)),
        None => Err(StoreError::InvalidPath(path.to_string())),
    }
}

/// Validate a collection path, returning it without surrounding slashes.
pub(crate) fn check_collection_path(path: &str) -> Result<&str, StoreError> {
    let trimmed = path.trim_matches('/');
    let segments = trimmed.split('/').count();
    if trimmed.is_empty() || segments % 2 != 1 || trimmed.split('/').any(str::is_empty) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}
