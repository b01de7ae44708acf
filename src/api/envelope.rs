//! The `{ data?, error?, status }` result envelope.

use serde::{Deserialize, Serialize};

/// Status used when no HTTP response was received (connect failure, timeout, cancel).
pub const STATUS_NETWORK_ERROR: u16 = 0;

/// Uniform result of a service call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: u16,
}

/// Error view of a failed envelope, for callers that prefer `?`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("response ({status}) carried no data")]
    Empty { status: u16 },
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, status: u16) -> Self {
        Self {
            data: Some(data),
            error: None,
            status,
        }
    }

    pub fn failure(error: impl Into<String>, status: u16) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    /// Transform the payload, keeping status and error untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            data: self.data.map(f),
            error: self.error,
            status: self.status,
        }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.data, self.error) {
            (_, Some(message)) if self.status == STATUS_NETWORK_ERROR => {
                Err(ApiError::Network(message))
            }
            (_, Some(message)) => Err(ApiError::Api {
                status: self.status,
                message,
            }),
            (Some(data), None) => Ok(data),
            (None, None) => Err(ApiError::Empty {
                status: self.status,
            }),
        }
    }
}
