//! Directory-backed storage.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;

use super::Storage;
use crate::error::{QuarryError, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores each key as a file in a directory.
///
/// The directory is created on first write. Values are written to a
/// temporary file and renamed into place, so readers never see a partial
/// value.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Creates storage rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(QuarryError::internal(format!("Invalid storage key '{key}'")));
        }
        Ok(self.root.join(key))
    }

    fn error(&self, err: std::io::Error) -> QuarryError {
        QuarryError::storage(self.uri(), err)
    }
}

#[async_trait]
impl Storage for FileStorage {
    fn uri(&self) -> String {
        self.root.display().to_string()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)?).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.error(e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| self.error(e))?;

        let temp = self.root.join(format!(
            ".{key}.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, value).await.map_err(|e| self.error(e))?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(self.error(e));
        }
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        fs::try_exists(self.path(key)?)
            .await
            .map_err(|e| self.error(e))
    }
}
