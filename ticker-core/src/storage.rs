use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::headline::CachedState;
use crate::settings::Settings;

pub mod keys {
    pub const SETTINGS: &str = "settings";
    pub const ARTICLES: &str = "articles";
    pub const HEADLINES: &str = "headlines";
    pub const ERROR: &str = "error";
    pub const LAST_UPDATE: &str = "lastUpdate";
}

/// Process-wide key-value store. Values are whole JSON documents; writes
/// replace them entirely. When backed by a file, every write rewrites the
/// file through a temp sibling and a rename.
#[derive(Debug, Clone)]
pub struct LocalStore {
    inner: Arc<RwLock<Map<String, Value>>>,
    path: Option<PathBuf>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Map::new())),
            path: None,
        }
    }

    /// Opens a file-backed store. A corrupt file falls back to its `.tmp`
    /// sibling, then to an empty store.
    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to parse store, trying tmp fallback");
                    match tokio::fs::read(tmp_path(&path)).await {
                        Ok(tmp_bytes) => serde_json::from_slice(&tmp_bytes).unwrap_or_default(),
                        Err(_) => Map::new(),
                    }
                }
            },
            Err(_) => Map::new(),
        };
        Self {
            inner: Arc::new(RwLock::new(data)),
            path: Some(path),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    /// Typed read; a value that no longer decodes is treated as absent.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        if value.is_null() {
            return None;
        }
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, key, "stored value has unexpected shape");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.set_many(vec![(key, value)]).await
    }

    /// Applies all entries under one lock and persists them together.
    pub async fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for (key, value) in entries {
            inner.insert(key.to_owned(), value);
        }
        self.persist(&inner).await
    }

    async fn persist(&self, data: &Map<String, Value>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            debug!("store is in-memory only; skipping persist");
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(data)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub async fn load_settings(&self) -> Option<Settings> {
        self.get_as(keys::SETTINGS).await
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.set(keys::SETTINGS, to_value(settings)?).await
    }

    pub async fn load_cached_state(&self) -> CachedState {
        CachedState {
            articles: self.get_as(keys::ARTICLES).await.unwrap_or_default(),
            last_update: self.get_as(keys::LAST_UPDATE).await,
            error: self.get_as(keys::ERROR).await,
        }
    }

    pub async fn save_cached_state(&self, state: &CachedState) -> Result<(), StoreError> {
        self.set_many(vec![
            (keys::ARTICLES, to_value(&state.articles)?),
            (keys::HEADLINES, Value::String(state.headlines())),
            (keys::ERROR, to_value(&state.error)?),
            (keys::LAST_UPDATE, to_value(&state.last_update)?),
        ])
        .await
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}
