//! Saved CLI session.
//!
//! Persists the signed-in user's ID token and an optional backend URL to
//! `{home}/.workforce/settings.json`. Environment variables provide the
//! initial values when no settings file exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Firebase ID token of the last signed-in user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Backend URL used when neither a flag nor `WORKFORCE_API_URL` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

#[derive(Debug)]
pub struct SettingsStore {
    settings: RwLock<Settings>,
    storage_path: PathBuf,
}

impl SettingsStore {
    /// Load from `{home}/.workforce/settings.json`, falling back to the environment.
    ///
    /// Defaults when no file exists:
    /// - `WORKFORCE_ID_TOKEN`: ID token to sign in with
    pub async fn new(home: &Path) -> Self {
        let storage_path = home.join(".workforce/settings.json");

        let settings = if storage_path.exists() {
            match Self::load_from_path(&storage_path) {
                Ok(s) => {
                    tracing::debug!("Loaded settings from {}", storage_path.display());
                    s
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load settings from {}: {}, using defaults",
                        storage_path.display(),
                        e
                    );
                    Self::defaults_from_env()
                }
            }
        } else {
            Self::defaults_from_env()
        };

        Self {
            settings: RwLock::new(settings),
            storage_path,
        }
    }

    fn defaults_from_env() -> Settings {
        Settings {
            id_token: std::env::var("WORKFORCE_ID_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            api_url: None,
        }
    }

    fn load_from_path(path: &Path) -> Result<Settings, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    async fn save_to_disk(&self) -> Result<(), std::io::Error> {
        let settings = self.settings.read().await;

        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(&*settings)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&self.storage_path, contents)?;
        tracing::debug!("Saved settings to {}", self.storage_path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Store (or with `None`, forget) the session token. Writes only on change.
    pub async fn set_id_token(&self, token: Option<String>) -> Result<(), std::io::Error> {
        let mut settings = self.settings.write().await;
        if settings.id_token == token {
            return Ok(());
        }
        settings.id_token = token;
        drop(settings);
        self.save_to_disk().await
    }

    pub async fn set_api_url(&self, api_url: Option<String>) -> Result<(), std::io::Error> {
        let mut settings = self.settings.write().await;
        if settings.api_url == api_url {
            return Ok(());
        }
        settings.api_url = api_url;
        drop(settings);
        self.save_to_disk().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_token_persists_across_loads() {
        let dir = tempdir().unwrap();

        let store = SettingsStore::new(dir.path()).await;
        store.set_id_token(Some("tok-1".to_string())).await.unwrap();
        assert!(store.path().exists());

        let reloaded = SettingsStore::new(dir.path()).await;
        assert_eq!(reloaded.get().await.id_token.as_deref(), Some("tok-1"));

        reloaded.set_id_token(None).await.unwrap();
        let cleared = SettingsStore::new(dir.path()).await;
        assert!(cleared.get().await.id_token.is_none());
    }

    #[tokio::test]
    async fn test_unchanged_value_does_not_write() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path()).await;

        store.set_api_url(None).await.unwrap();
        assert!(!store.path().exists());

        store
            .set_api_url(Some("http://10.0.0.5:8001".to_string()))
            .await
            .unwrap();
        let saved = std::fs::read_to_string(store.path()).unwrap();
        assert!(saved.contains("10.0.0.5"));
        assert!(!saved.contains("id_token"));
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".workforce")).unwrap();
        std::fs::write(dir.path().join(".workforce/settings.json"), "{not json").unwrap();

        let store = SettingsStore::new(dir.path()).await;
        assert!(store.get().await.api_url.is_none());
    }
}
