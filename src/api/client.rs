//! HTTP client for the workforce REST backend.

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::envelope::{ApiResponse, STATUS_NETWORK_ERROR};

/// Thin wrapper over `reqwest` that never fails: every outcome is an [`ApiResponse`].
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url` with no request timeout.
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, None)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = match builder.build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to build HTTP client, using defaults: {}", e);
                Client::new()
            }
        };

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        let req = self.client.get(self.url(path));
        self.execute(Method::GET, path, req).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let req = self.client.post(self.url(path)).json(body);
        self.execute(Method::POST, path, req).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let req = self.client.put(self.url(path)).json(body);
        self.execute(Method::PUT, path, req).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let req = self.client.patch(self.url(path)).json(body);
        self.execute(Method::PATCH, path, req).await
    }

    /// DELETE `path`. The response body, if any, is ignored.
    pub async fn delete(&self, path: &str) -> ApiResponse<()> {
        let resp = match self.client.delete(self.url(path)).send().await {
            Ok(r) => r,
            Err(e) => return network_failure(&Method::DELETE, path, e),
        };

        let status = resp.status();
        tracing::debug!("DELETE {} -> {}", path, status);

        if status.is_success() {
            return ApiResponse::ok((), status.as_u16());
        }

        let body = resp.text().await.unwrap_or_default();
        ApiResponse::failure(error_message(status.as_u16(), &body), status.as_u16())
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        req: RequestBuilder,
    ) -> ApiResponse<T> {
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => return network_failure(&method, path, e),
        };

        let status = resp.status();
        let code = status.as_u16();
        tracing::debug!("{} {} -> {}", method, path, status);

        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => {
                return ApiResponse::failure(format!("Failed to read response body: {}", e), code)
            }
        };

        if !status.is_success() {
            let message = error_message(code, &body);
            tracing::warn!("{} {} failed: {}", method, path, message);
            return ApiResponse::failure(message, code);
        }

        // An empty 2xx body decodes as JSON null (e.g. into `()` or `Option<T>`).
        let raw = if body.trim().is_empty() { "null" } else { body.as_str() };
        match serde_json::from_str::<T>(raw) {
            Ok(data) => ApiResponse::ok(data, code),
            Err(e) => {
                tracing::warn!("{} {} returned an unexpected body: {}", method, path, e);
                ApiResponse::failure(format!("Failed to parse response: {}", e), code)
            }
        }
    }
}

fn network_failure<T>(method: &Method, path: &str, e: reqwest::Error) -> ApiResponse<T> {
    let message = if e.is_timeout() {
        format!("Request timeout: {}", e)
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        format!("Request failed: {}", e)
    };
    tracing::warn!("{} {} failed: {}", method, path, message);
    ApiResponse::failure(message, STATUS_NETWORK_ERROR)
}

/// Pick the most useful message out of an error response.
///
/// FastAPI-style `{"detail": "..."}` wins, then any non-empty body, then a generic line.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value.get("detail") {
            Some(serde_json::Value::String(detail)) => return detail.clone(),
            Some(detail) if !detail.is_null() => return detail.to_string(),
            _ => {}
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP error! status: {}", status)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockBackend;
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};

    #[test]
    fn test_error_message_prefers_detail() {
        assert_eq!(
            error_message(404, r#"{"detail": "Agent not found"}"#),
            "Agent not found"
        );
        assert_eq!(error_message(500, "  upstream exploded \n"), "upstream exploded");
        assert_eq!(error_message(503, ""), "HTTP error! status: 503");
    }

    #[tokio::test]
    async fn test_success_and_http_error_envelopes() {
        let router = Router::new()
            .route(
                "/agents",
                get(|| async { Json(serde_json::json!([{"id": "a"}])) }),
            )
            .route(
                "/agents/missing",
                get(|| async {
                    (
                        StatusCode::NOT_FOUND,
                        Json(serde_json::json!({"detail": "Agent not found"})),
                    )
                }),
            );
        let backend = MockBackend::start(router).await;
        let client = ApiClient::new(&backend.url());

        let ok: ApiResponse<Vec<serde_json::Value>> = client.get("/agents").await;
        assert!(ok.is_success());
        assert_eq!(ok.status, 200);
        assert_eq!(ok.data.unwrap().len(), 1);

        let missing: ApiResponse<serde_json::Value> = client.get("/agents/missing").await;
        assert_eq!(missing.status, 404);
        assert_eq!(missing.error.as_deref(), Some("Agent not found"));
        assert!(missing.data.is_none());
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let router = Router::new().route(
            "/echo",
            post(|Json(body): Json<serde_json::Value>| async move { Json(body) }),
        );
        let backend = MockBackend::start(router).await;
        let client = ApiClient::new(&backend.url());

        let resp: ApiResponse<serde_json::Value> =
            client.post("/echo", &serde_json::json!({"x": 1})).await;
        assert_eq!(resp.data, Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_delete_ignores_body() {
        let router = Router::new().route(
            "/tasks/t1",
            delete(|| async { Json(serde_json::json!({"message": "deleted"})) }),
        );
        let backend = MockBackend::start(router).await;
        let client = ApiClient::new(&backend.url());

        let resp = client.delete("/tasks/t1").await;
        assert_eq!(resp, ApiResponse::ok((), 200));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_reported() {
        let router = Router::new().route("/agents", get(|| async { "not json" }));
        let backend = MockBackend::start(router).await;
        let client = ApiClient::new(&backend.url());

        let resp: ApiResponse<Vec<serde_json::Value>> = client.get("/agents").await;
        assert_eq!(resp.status, 200);
        assert!(resp.error.unwrap().starts_with("Failed to parse response"));
    }

    #[tokio::test]
    async fn test_network_failure_uses_sentinel_status() {
        let url = MockBackend::unreachable_url().await;
        let client = ApiClient::new(&url);

        let resp: ApiResponse<serde_json::Value> = client.get("/agents").await;
        assert_eq!(resp.status, STATUS_NETWORK_ERROR);
        assert!(resp.error.is_some());
    }
}
