//! Environment configuration.
//!
//! | variable | meaning |
//! |---|---|
//! | `WORKFORCE_API_URL` | REST backend base URL (default `http://localhost:8001`) |
//! | `WORKFORCE_REQUEST_TIMEOUT_SECS` | per-request timeout, unset or `0` for none |
//! | `FIREBASE_PROJECT_ID` | Firestore project; unset keeps data in memory |
//! | `FIREBASE_API_KEY` | web API key sent with Firestore requests |
//! | `FIRESTORE_EMULATOR_HOST` | `host:port` of a local Firestore emulator |
//! | `WORKFORCE_HOME` | directory holding `.workforce/settings.json` |

use std::path::PathBuf;
use std::time::Duration;

use crate::store::FirestoreConfig;

pub const DEFAULT_API_URL: &str = "http://localhost:8001";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not a valid URL ({value}): {source}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        source: url::ParseError,
    },

    #[error("{var} must be http or https, got {value}")]
    UnsupportedScheme { var: &'static str, value: String },

    #[error("{var} must be a whole number of seconds, got {value}")]
    InvalidTimeout { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub api_url: Option<String>,
    pub request_timeout: Option<Duration>,
    pub firebase_project_id: Option<String>,
    pub firebase_api_key: Option<String>,
    pub firestore_emulator_host: Option<String>,
    pub home: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = get("WORKFORCE_API_URL")
            .map(|raw| parse_api_url("WORKFORCE_API_URL", &raw))
            .transpose()?;

        let request_timeout = match get("WORKFORCE_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidTimeout {
                    var: "WORKFORCE_REQUEST_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            api_url,
            request_timeout,
            firebase_project_id: get("FIREBASE_PROJECT_ID"),
            firebase_api_key: get("FIREBASE_API_KEY"),
            firestore_emulator_host: get("FIRESTORE_EMULATOR_HOST"),
            home: get("WORKFORCE_HOME").map(PathBuf::from),
        })
    }

    /// Base URL of the REST backend.
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Settings directory root (current directory by default).
    pub fn home(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Firestore connection, when a project is configured.
    pub fn firestore(&self) -> Option<FirestoreConfig> {
        self.firebase_project_id
            .as_ref()
            .map(|project_id| FirestoreConfig {
                project_id: project_id.clone(),
                api_key: self.firebase_api_key.clone(),
                emulator_host: self.firestore_emulator_host.clone(),
            })
    }
}

/// Check that `raw` is an absolute http(s) URL; returns it without a trailing slash.
pub fn parse_api_url(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
        var,
        value: raw.to_string(),
        source,
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme {
            var,
            value: raw.to_string(),
        });
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}
