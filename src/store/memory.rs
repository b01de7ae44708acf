//! In-process document store.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::value::{fields_from_firestore, fields_to_firestore};
use super::{
    check_collection_path, split_document_path, Direction, Document, DocumentStore, Fields,
    Query, StoreError,
};

/// Document store kept in memory, keyed by document path.
///
/// Used when no Firestore project is configured, and by tests. A store opened
/// with [`MemoryStore::persistent`] rewrites its JSON file after every change.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, Fields>>,
    storage_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the store saved at `path`, starting empty when it is missing or
    /// unreadable.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let storage_path = path.into();
        let docs = if storage_path.exists() {
            match Self::load_from_path(&storage_path) {
                Ok(docs) => {
                    tracing::debug!("Loaded local store from {}", storage_path.display());
                    docs
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load local store from {}: {}, starting empty",
                        storage_path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Self {
            docs: RwLock::new(docs),
            storage_path: Some(storage_path),
        }
    }

    fn load_from_path(path: &Path) -> Result<BTreeMap<String, Fields>, StoreError> {
        let contents = std::fs::read_to_string(path)?;
        let value: Value =
            serde_json::from_str(&contents).map_err(|e| StoreError::Decode(e.to_string()))?;
        let Value::Object(entries) = value else {
            return Err(StoreError::Decode("expected an object of documents".to_string()));
        };
        entries
            .iter()
            .map(|(path, fields)| -> Result<(String, Fields), StoreError> {
                Ok((path.clone(), fields_from_firestore(fields)?))
            })
            .collect()
    }

    fn save_to_disk(&self, docs: &BTreeMap<String, Fields>) -> Result<(), StoreError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot: serde_json::Map<String, Value> = docs
            .iter()
            .map(|(path, fields)| (path.clone(), fields_to_firestore(fields)))
            .collect();
        let contents = serde_json::to_string_pretty(&Value::Object(snapshot))
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Number of documents directly under `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        let docs = self.docs.read().await;
        docs.keys()
            .filter(|path| is_child_of(path, collection))
            .count()
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn is_child_of(doc_path: &str, collection: &str) -> bool {
    match doc_path.rsplit_once('/') {
        Some((parent, _)) => parent == collection.trim_matches('/'),
        None => false,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let (_, id) = split_document_path(path)?;
        let docs = self.docs.read().await;
        Ok(docs.get(&normalize(path)).map(|fields| Document {
            id: id.to_string(),
            fields: fields.clone(),
        }))
    }

    async fn set(&self, path: &str, fields: Fields, merge: bool) -> Result<(), StoreError> {
        split_document_path(path)?;
        let mut docs = self.docs.write().await;
        let entry = docs.entry(normalize(path)).or_default();
        if merge {
            entry.extend(fields);
        } else {
            *entry = fields;
        }
        self.save_to_disk(&docs)
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let collection = check_collection_path(collection)?;
        let id = Uuid::new_v4().simple().to_string();
        let mut docs = self.docs.write().await;
        docs.insert(format!("{}/{}", collection, id), fields);
        self.save_to_disk(&docs)?;
        Ok(id)
    }

    async fn update(&self, path: &str, fields: Fields) -> Result<(), StoreError> {
        split_document_path(path)?;
        let mut docs = self.docs.write().await;
        match docs.get_mut(&normalize(path)) {
            Some(existing) => existing.extend(fields),
            None => return Err(StoreError::NotFound(path.to_string())),
        }
        self.save_to_disk(&docs)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        split_document_path(path)?;
        let mut docs = self.docs.write().await;
        docs.remove(&normalize(path));
        self.save_to_disk(&docs)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let collection = check_collection_path(collection)?;
        let docs = self.docs.read().await;

        let mut matches: Vec<Document> = docs
            .iter()
            .filter(|(path, _)| is_child_of(path, collection))
            .filter(|(_, fields)| {
                query
                    .filters
                    .iter()
                    .all(|(field, value)| fields.get(field) == Some(value))
            })
            .map(|(path, fields)| Document {
                id: path.rsplit('/').next().unwrap_or(path).to_string(),
                fields: fields.clone(),
            })
            .collect();

        if let Some((field, direction)) = &query.order_by {
            // documents without the ordering field are excluded, as Firestore does
            matches.retain(|d| d.fields.contains_key(field));
            matches.sort_by(|a, b| {
                let ord = a.fields[field].compare(&b.fields[field]);
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }

        Ok(matches)
    }
}
