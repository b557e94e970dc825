//! Remote cache mapping fingerprints to execution ids.

use std::sync::Arc;

use tracing::{debug, warn};

use super::Fingerprint;
use crate::error::Result;
use crate::service::ExecutionId;
use crate::storage::Storage;

/// Remote cache, usually shared storage reachable by every client.
#[derive(Debug, Clone)]
pub struct RemoteCache {
    storage: Arc<dyn Storage>,
}

impl RemoteCache {
    /// Creates a cache on top of the given storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// URI of the underlying storage.
    pub fn uri(&self) -> String {
        self.storage.uri()
    }

    /// Looks up the execution id recorded for a fingerprint.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ExecutionId>> {
        let key = fingerprint.query_key();
        let Some(text) = self.storage.get(&key).await? else {
            return Ok(None);
        };
        let id = text.trim();
        if id.is_empty() {
            warn!(key = %key, uri = %self.uri(), "Ignoring empty cache record");
            return Ok(None);
        }
        Ok(Some(ExecutionId::new(id)))
    }

    /// Records the execution id for a fingerprint.
    pub async fn put(&self, fingerprint: &Fingerprint, execution_id: &ExecutionId) -> Result<()> {
        self.storage
            .set(&fingerprint.query_key(), execution_id.as_str())
            .await?;
        debug!(fingerprint = %fingerprint, execution_id = %execution_id, "Stored execution id");
        Ok(())
    }
}
