//! Local cache of execution records and results.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{results_key, Fingerprint, LocalEntry};
use crate::error::{QuarryError, Result};
use crate::results::QueryResults;
use crate::service::ExecutionId;
use crate::storage::Storage;

/// Local cache, usually a directory on disk.
///
/// Records that cannot be parsed are reported and treated as missing, so a
/// damaged cache file costs a re-execution rather than an error.
#[derive(Debug, Clone)]
pub struct LocalCache {
    storage: Arc<dyn Storage>,
}

impl LocalCache {
    /// Creates a cache on top of the given storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// URI of the underlying storage.
    pub fn uri(&self) -> String {
        self.storage.uri()
    }

    /// Looks up the execution record for a fingerprint.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<LocalEntry>> {
        let key = fingerprint.execution_key();
        let Some(text) = self.storage.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(key = %key, uri = %self.uri(), "Ignoring corrupt cache record: {}", e);
                Ok(None)
            }
        }
    }

    /// Stores the execution record for a fingerprint.
    pub async fn put(&self, fingerprint: &Fingerprint, entry: &LocalEntry) -> Result<()> {
        let text = serde_json::to_string_pretty(entry)
            .map_err(|e| QuarryError::internal(format!("Failed to encode cache record: {e}")))?;
        self.storage.set(&fingerprint.execution_key(), &text).await?;
        debug!(fingerprint = %fingerprint, execution_id = %entry.execution_id, "Stored execution record");
        Ok(())
    }

    /// Loads the cached results of an execution.
    pub async fn get_results(&self, execution_id: &ExecutionId) -> Result<Option<QueryResults>> {
        let key = results_key(execution_id);
        let Some(text) = self.storage.get(&key).await? else {
            return Ok(None);
        };
        match QueryResults::from_csv(&text) {
            Ok(results) => Ok(Some(results)),
            Err(e) => {
                warn!(key = %key, uri = %self.uri(), "Ignoring corrupt cached results: {}", e);
                Ok(None)
            }
        }
    }

    /// Returns true if results of the execution are cached.
    pub async fn has_results(&self, execution_id: &ExecutionId) -> Result<bool> {
        self.storage.has(&results_key(execution_id)).await
    }

    /// Stores the results of an execution.
    pub async fn put_results(
        &self,
        execution_id: &ExecutionId,
        results: &QueryResults,
    ) -> Result<()> {
        self.storage
            .set(&results_key(execution_id), &results.to_csv())
            .await?;
        debug!(execution_id = %execution_id, rows = results.len(), "Stored results");
        Ok(())
    }
}
