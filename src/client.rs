//! Client facade.
//!
//! Owns the configuration and the collaborators, and exposes the query
//! operations with optional per-call overrides.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{LocalCache, RemoteCache};
use crate::config::{ClientConfig, ConfigOverrides};
use crate::error::Result;
use crate::query::{QueryController, QueryHandle};
use crate::results::QueryResults;
use crate::service::{ExecutionId, QueryService};
use crate::sql::Params;
use crate::storage::{storage_from_uri, Storage};

/// Entry point for running queries.
///
/// Cheap to clone. [`Client::using`] derives a client with different
/// settings that shares the service, caches and cancellation token.
#[derive(Debug, Clone)]
pub struct Client {
    controller: QueryController,
    config: ClientConfig,
    cancel: CancellationToken,
}

impl Client {
    /// Creates a client, opening the caches named in the configuration.
    pub fn new(service: Arc<dyn QueryService>, config: ClientConfig) -> Result<Self> {
        let local = config.cache.local.as_deref().map(storage_from_uri).transpose()?;
        let remote = config
            .cache
            .remote
            .as_deref()
            .map(storage_from_uri)
            .transpose()?;
        Ok(Self::with_storage(service, config, local, remote))
    }

    /// Creates a client on top of already opened cache storage.
    pub fn with_storage(
        service: Arc<dyn QueryService>,
        config: ClientConfig,
        local: Option<Arc<dyn Storage>>,
        remote: Option<Arc<dyn Storage>>,
    ) -> Self {
        debug!(
            local = ?local.as_ref().map(|s| s.uri()),
            remote = ?remote.as_ref().map(|s| s.uri()),
            "Creating client"
        );
        Self {
            controller: QueryController::new(
                service,
                local.map(LocalCache::new),
                remote.map(RemoteCache::new),
            ),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to interrupt queries waited on by this client.
    ///
    /// Handles created afterwards get child tokens, so cancelling `token`
    /// interrupts all of them.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns a client with the overrides applied. `self` is unchanged.
    pub fn using(&self, overrides: &ConfigOverrides) -> Client {
        Self {
            controller: self.controller.clone(),
            config: self.config.with_overrides(overrides),
            cancel: self.cancel.clone(),
        }
    }

    /// Runs a query and returns its results.
    pub async fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<QueryResults> {
        self.submit(sql, params).await?.get_results().await
    }

    /// Starts a query, or finds a cached one, without waiting for it.
    pub async fn submit(&self, sql: &str, params: impl Into<Params>) -> Result<QueryHandle> {
        debug!(database = ?self.config.query.database, "submit");
        self.controller
            .submit(sql, &params.into(), &self.config, self.cancel.child_token())
            .await
    }

    /// Runs a query with one-off overrides.
    pub async fn execute_with(
        &self,
        sql: &str,
        params: impl Into<Params>,
        overrides: &ConfigOverrides,
    ) -> Result<QueryResults> {
        self.using(overrides).execute(sql, params).await
    }

    /// Starts a query with one-off overrides.
    pub async fn submit_with(
        &self,
        sql: &str,
        params: impl Into<Params>,
        overrides: &ConfigOverrides,
    ) -> Result<QueryHandle> {
        self.using(overrides).submit(sql, params).await
    }

    /// Returns a handle to an existing execution.
    pub fn get_query(&self, execution_id: impl Into<ExecutionId>) -> QueryHandle {
        self.controller
            .attach(execution_id.into(), &self.config, self.cancel.child_token())
    }
}
