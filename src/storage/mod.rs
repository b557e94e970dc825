//! Key/value storage backends for the caches.
//!
//! Backends are addressed by URI:
//! - `file:///path` or a plain path (with `~` expansion): a directory
//! - `memory:`: process-local map, mostly for tests
//! - `http://` / `https://`: GET and PUT against a base URL

mod filesystem;
mod http;
mod memory;

pub use filesystem::FileStorage;
pub use http::HttpStorage;
pub use memory::MemoryStorage;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::{QuarryError, Result};

/// Trait defining a text key/value store.
///
/// A missing key is `Ok(None)`, never an error. Writes replace the whole
/// value.
#[async_trait]
pub trait Storage: Send + Sync + fmt::Debug {
    /// URI identifying this storage.
    fn uri(&self) -> String;

    /// Reads the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns true if a value is stored under `key`.
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Opens the storage a URI points to.
pub fn storage_from_uri(uri: &str) -> Result<Arc<dyn Storage>> {
    if uri.starts_with("memory:") {
        return Ok(Arc::new(MemoryStorage::new()));
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        let url = Url::parse(uri)
            .map_err(|e| QuarryError::config(format!("Invalid storage URI '{uri}': {e}")))?;
        return Ok(Arc::new(HttpStorage::new(url)?));
    }
    if uri.starts_with("file:") {
        let path = Url::parse(uri)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .ok_or_else(|| QuarryError::config(format!("Invalid file URI '{uri}'")))?;
        return Ok(Arc::new(FileStorage::new(path)));
    }
    if let Some((scheme, _)) = uri.split_once("://") {
        return Err(QuarryError::config(format!(
            "Unsupported storage scheme '{scheme}' in '{uri}'"
        )));
    }
    Ok(Arc::new(FileStorage::new(expand_home(uri))))
}

/// Expands a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
