//! Firestore client over the REST v1 API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::value::{fields_from_firestore, fields_to_firestore};
use super::{
    check_collection_path, split_document_path, Direction, Document, DocumentStore, Fields,
    Query, StoreError,
};

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com";

/// Connection settings for a Firestore database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Web API key, sent as the `key` query parameter.
    pub api_key: Option<String>,
    /// `host:port` of a local emulator; overrides the production host.
    pub emulator_host: Option<String>,
}

/// Firestore client for the `(default)` database of one project.
pub struct FirestoreStore {
    client: Client,
    documents_url: String,
    api_key: Option<String>,
    id_token: RwLock<Option<String>>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    pub fn new(config: &FirestoreConfig) -> Self {
        let host = match &config.emulator_host {
            Some(h) => format!("http://{}", h.trim_end_matches('/')),
            None => FIRESTORE_HOST.to_string(),
        };
        Self {
            client: Client::new(),
            documents_url: format!(
                "{}/v1/projects/{}/databases/(default)/documents",
                host, config.project_id
            ),
            api_key: config.api_key.clone(),
            id_token: RwLock::new(None),
        }
    }

    /// URL of a document or collection path.
    fn document_url(&self, path: &str) -> String {
        format!("{}/{}", self.documents_url, path.trim_matches('/'))
    }

    /// Attach the API key and the user's bearer token.
    async fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let mut req = req;
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key)]);
        }
        if let Some(token) = self.id_token.read().await.as_deref() {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        req
    }

    /// Send and return the body of a successful response.
    async fn send(&self, req: RequestBuilder, what: &str) -> Result<String, StoreError> {
        let resp = self.authorize(req).await.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: format!("Failed to {}: {}", what, error_text(&text)),
            });
        }
        Ok(text)
    }

    fn update_mask(fields: &Fields) -> Vec<(&'static str, String)> {
        fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", quote_field_path(k)))
            .collect()
    }
}

/// Pull `error.message` out of a Google API error body.
fn error_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Field paths that are not plain identifiers must be backtick-quoted.
fn quote_field_path(field: &str) -> String {
    let simple = field
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// Build a `Document` from a REST document resource.
fn parse_document(value: &Value) -> Result<Document, StoreError> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Decode("document without a name".to_string()))?;
    let id = name.rsplit('/').next().unwrap_or(name).to_string();
    let fields = match value.get("fields") {
        Some(f) => fields_from_firestore(f)?,
        None => Fields::new(),
    };
    Ok(Document { id, fields })
}

/// Encode a `Query` as a `structuredQuery` for `collection_id`.
fn structured_query(collection_id: &str, query: &Query) -> Value {
    let mut structured = json!({ "from": [{ "collectionId": collection_id }] });

    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|(field, value)| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": quote_field_path(field) },
                    "op": "EQUAL",
                    "value": value.to_firestore()
                }
            })
        })
        .collect();

    match filters.len() {
        0 => {}
        1 => structured["where"] = filters.into_iter().next().unwrap_or(Value::Null),
        _ => {
            structured["where"] = json!({ "compositeFilter": { "op": "AND", "filters": filters } })
        }
    }

    if let Some((field, direction)) = &query.order_by {
        let direction = match direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured["orderBy"] = json!([{
            "field": { "fieldPath": quote_field_path(field) },
            "direction": direction
        }]);
    }

    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }

    json!({ "structuredQuery": structured })
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        split_document_path(path)?;
        let req = self.client.get(self.document_url(path));
        let resp = self.authorize(req).await.send().await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: format!("Failed to get {}: {}", path, error_text(&text)),
            });
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))?;
        parse_document(&value).map(Some)
    }

    async fn set(&self, path: &str, fields: Fields, merge: bool) -> Result<(), StoreError> {
        split_document_path(path)?;
        let mut req = self
            .client
            .patch(self.document_url(path))
            .json(&json!({ "fields": fields_to_firestore(&fields) }));
        if merge {
            req = req.query(&Self::update_mask(&fields));
        }

        self.send(req, &format!("write {}", path)).await?;
        tracing::debug!("Wrote {} ({} fields, merge={})", path, fields.len(), merge);
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let collection = check_collection_path(collection)?;
        let req = self
            .client
            .post(self.document_url(collection))
            .json(&json!({ "fields": fields_to_firestore(&fields) }));

        let text = self.send(req, &format!("add to {}", collection)).await?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))?;
        let doc = parse_document(&value)?;
        tracing::debug!("Added {}/{}", collection, doc.id);
        Ok(doc.id)
    }

    async fn update(&self, path: &str, fields: Fields) -> Result<(), StoreError> {
        split_document_path(path)?;
        let mut params = Self::update_mask(&fields);
        params.push(("currentDocument.exists", "true".to_string()));
        let req = self
            .client
            .patch(self.document_url(path))
            .query(&params)
            .json(&json!({ "fields": fields_to_firestore(&fields) }));

        match self.send(req, &format!("update {}", path)).await {
            Err(StoreError::Status { status: 404, .. }) => Err(StoreError::NotFound(path.to_string())),
            other => other.map(|_| ()),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        split_document_path(path)?;
        let req = self.client.delete(self.document_url(path));
        self.send(req, &format!("delete {}", path)).await?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let collection = check_collection_path(collection)?;
        let (parent_url, collection_id) = match collection.rsplit_once('/') {
            Some((parent, id)) => (self.document_url(parent), id),
            None => (self.documents_url.clone(), collection),
        };

        let req = self
            .client
            .post(format!("{}:runQuery", parent_url))
            .json(&structured_query(collection_id, query));
        let text = self.send(req, &format!("query {}", collection)).await?;

        // runQuery answers with one entry per result; entries without a
        // `document` only carry progress metadata.
        let rows: Vec<Value> =
            serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))?;
        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(parse_document)
            .collect()
    }

    async fn set_credentials(&self, id_token: Option<String>) {
        *self.id_token.write().await = id_token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldValue;
    use crate::test_support::MockBackend;
    use axum::extract::{Path, RawQuery};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn emulator_config(backend: &MockBackend) -> FirestoreConfig {
        FirestoreConfig {
            project_id: "demo".to_string(),
            api_key: Some("web-key".to_string()),
            emulator_host: Some(backend.url().trim_start_matches("http://").to_string()),
        }
    }

    #[test]
    fn test_structured_query_shape() {
        let query = Query::new()
            .filter_eq("status", FieldValue::from("pending"))
            .order_by("created_at", Direction::Descending)
            .limit(5);
        let body = structured_query("tasks", &query);
        let sq = &body["structuredQuery"];

        assert_eq!(sq["from"][0]["collectionId"], "tasks");
        assert_eq!(sq["where"]["fieldFilter"]["field"]["fieldPath"], "status");
        assert_eq!(sq["where"]["fieldFilter"]["value"]["stringValue"], "pending");
        assert_eq!(sq["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(sq["limit"], 5);
    }

    #[test]
    fn test_structured_query_composite_filter() {
        let query = Query::new()
            .filter_eq("status", FieldValue::from("pending"))
            .filter_eq("is_active", FieldValue::Bool(true));
        let body = structured_query("agents", &query);
        assert_eq!(body["structuredQuery"]["where"]["compositeFilter"]["op"], "AND");
        assert!(body["structuredQuery"].get("orderBy").is_none());
    }

    #[test]
    fn test_quote_field_path() {
        assert_eq!(quote_field_path("lastLoginAt"), "lastLoginAt");
        assert_eq!(quote_field_path("display-name"), "`display-name`");
    }

    #[tokio::test]
    async fn test_get_missing_document_is_none() {
        let router = Router::new().route(
            "/v1/projects/demo/databases/(default)/documents/*path",
            get(|| async { StatusCode::NOT_FOUND }),
        );
        let backend = MockBackend::start(router).await;
        let store = FirestoreStore::new(&emulator_config(&backend));

        assert!(store.get("users/u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_sends_credentials_and_decodes() {
        let seen = Arc::new(Mutex::new(None::<(String, Option<String>)>));
        let seen_in_handler = seen.clone();
        let router = Router::new().route(
            "/v1/projects/demo/databases/(default)/documents/*path",
            get(
                move |Path(path): Path<String>, RawQuery(query): RawQuery, headers: HeaderMap| {
                    let seen = seen_in_handler.clone();
                    async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|h| h.to_str().ok())
                            .map(str::to_string);
                        *seen.lock().unwrap() = Some((query.unwrap_or_default(), auth));
                        Json(json!({
                            "name": format!("projects/demo/databases/(default)/documents/{}", path),
                            "fields": {
                                "uid": {"stringValue": "u1"},
                                "userType": {"stringValue": "student"}
                            }
                        }))
                    }
                },
            ),
        );
        let backend = MockBackend::start(router).await;
        let store = FirestoreStore::new(&emulator_config(&backend));
        store.set_credentials(Some("id-token".to_string())).await;

        let doc = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(doc.id, "u1");
        assert_eq!(doc.fields["userType"], FieldValue::from("student"));

        let (query, auth) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(query, "key=web-key");
        assert_eq!(auth.as_deref(), Some("Bearer id-token"));
    }

    #[tokio::test]
    async fn test_run_query_skips_metadata_rows() {
        let router = Router::new().route(
            "/v1/projects/demo/databases/(default)/documents/*path",
            post(|Path(path): Path<String>, Json(body): Json<Value>| async move {
                assert_eq!(path, "users/u1:runQuery");
                assert_eq!(body["structuredQuery"]["from"][0]["collectionId"], "tasks");
                Json(json!([
                    {"readTime": "2024-01-01T00:00:00Z"},
                    {"document": {
                        "name": "projects/demo/databases/(default)/documents/users/u1/tasks/t1",
                        "fields": {"description": {"stringValue": "Plan launch"}}
                    }}
                ]))
            }),
        );
        let backend = MockBackend::start(router).await;
        let store = FirestoreStore::new(&emulator_config(&backend));

        let docs = store.query("users/u1/tasks", &Query::new()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "t1");
    }

    #[tokio::test]
    async fn test_error_body_message_is_surfaced() {
        let router = Router::new().route(
            "/v1/projects/demo/databases/(default)/documents/*path",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({"error": {"code": 403, "message": "Missing or insufficient permissions."}})),
                )
            }),
        );
        let backend = MockBackend::start(router).await;
        let store = FirestoreStore::new(&emulator_config(&backend));

        match store.get("users/u1").await {
            Err(StoreError::Status { status, message }) => {
                assert_eq!(status, 403);
                assert!(message.contains("Missing or insufficient permissions."));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
