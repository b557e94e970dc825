//! Cache lookup, submission and polling of queries.
//!
//! A query is served from the first place that has it: the local cache,
//! then the remote cache, then a new execution.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::backoff::Backoff;
use super::handle::{HandleSettings, Origin, QueryHandle};
use crate::cache::{Fingerprint, LocalCache, LocalEntry, RemoteCache};
use crate::config::{ClientConfig, PollingConfig};
use crate::error::Result;
use crate::results::QueryResults;
use crate::service::{ExecutionId, QueryInfo, QueryService, QueryState};
use crate::sql::{bind, is_select, normalize_sql, truncate_sql, Params, LOG_EXCERPT_LEN};

/// SQL prepared for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    /// Final SQL with parameters bound.
    pub sql: String,

    /// Cache key of the query.
    pub fingerprint: Fingerprint,

    /// Whether the statement may be served from and recorded in caches.
    pub cacheable: bool,
}

/// Coordinates the caches and the remote service.
///
/// Holds no state of its own besides its collaborators; clones share them.
#[derive(Clone)]
pub struct QueryController {
    service: Arc<dyn QueryService>,
    local: Option<LocalCache>,
    remote: Option<RemoteCache>,
}

impl fmt::Debug for QueryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryController")
            .field("service", &self.service)
            .field("local", &self.local.as_ref().map(LocalCache::uri))
            .field("remote", &self.remote.as_ref().map(RemoteCache::uri))
            .finish()
    }
}

impl QueryController {
    pub fn new(
        service: Arc<dyn QueryService>,
        local: Option<LocalCache>,
        remote: Option<RemoteCache>,
    ) -> Self {
        Self {
            service,
            local,
            remote,
        }
    }

    /// Returns the local cache, if configured.
    pub fn local(&self) -> Option<&LocalCache> {
        self.local.as_ref()
    }

    /// Returns the remote cache, if configured.
    pub fn remote(&self) -> Option<&RemoteCache> {
        self.remote.as_ref()
    }

    pub(crate) fn service(&self) -> &Arc<dyn QueryService> {
        &self.service
    }

    /// Normalizes and binds SQL, and computes its fingerprint.
    pub fn prepare(sql: &str, params: &Params, config: &ClientConfig) -> Result<PreparedQuery> {
        let template = if config.query.normalize {
            normalize_sql(sql)
        } else {
            sql.to_string()
        };
        let sql = bind(&template, params)?;
        let fingerprint = Fingerprint::compute(&template, params, &config.target())?;
        let cacheable = is_select(&sql);
        Ok(PreparedQuery {
            sql,
            fingerprint,
            cacheable,
        })
    }

    /// Returns a handle to the query, reusing a cached execution when
    /// allowed, or submitting a new one.
    ///
    /// If `cancel` is already cancelled when the submission returns, the new
    /// execution is interrupted before this returns.
    pub async fn submit(
        &self,
        sql: &str,
        params: &Params,
        config: &ClientConfig,
        cancel: CancellationToken,
    ) -> Result<QueryHandle> {
        let prepared = Self::prepare(sql, params, config)?;
        let settings = HandleSettings::for_query(config, prepared.cacheable);

        if prepared.cacheable && config.cache.reads() {
            if let Some(handle) = self
                .lookup_local(&prepared, &settings, &cancel)
                .await?
            {
                return Ok(handle);
            }
            if let Some(handle) = self
                .lookup_remote(&prepared, &settings, &cancel)
                .await?
            {
                return Ok(handle);
            }
        } else if !prepared.cacheable {
            debug!(sql = %truncate_sql(&prepared.sql, LOG_EXCERPT_LEN), "Statement is not cacheable");
        }

        let target = config.target();
        let execution_id = self.service.submit(&prepared.sql, &target).await?;
        info!(
            execution_id = %execution_id,
            sql = %truncate_sql(&prepared.sql, LOG_EXCERPT_LEN),
            "Submitted query"
        );

        let handle = QueryHandle::new(
            self.clone(),
            execution_id.clone(),
            Origin::Submitted,
            Some(prepared.fingerprint.clone()),
            settings,
            cancel.clone(),
            None,
        );

        if cancel.is_cancelled() {
            return Err(handle.interrupt().await);
        }

        if prepared.cacheable && config.cache.writes() {
            if let Some(remote) = &self.remote {
                remote.put(&prepared.fingerprint, &execution_id).await?;
            }
        }

        Ok(handle)
    }

    /// Returns a handle to an execution known by id.
    pub fn attach(
        &self,
        execution_id: ExecutionId,
        config: &ClientConfig,
        cancel: CancellationToken,
    ) -> QueryHandle {
        QueryHandle::new(
            self.clone(),
            execution_id,
            Origin::Attached,
            None,
            HandleSettings::for_attached(config),
            cancel,
            None,
        )
    }

    async fn lookup_local(
        &self,
        prepared: &PreparedQuery,
        settings: &HandleSettings,
        cancel: &CancellationToken,
    ) -> Result<Option<QueryHandle>> {
        let Some(local) = &self.local else {
            return Ok(None);
        };
        let Some(entry) = local.get(&prepared.fingerprint).await? else {
            return Ok(None);
        };

        let usable = match entry.state() {
            QueryState::Succeeded => {
                let cached = local.has_results(&entry.execution_id).await?;
                if !cached {
                    debug!(execution_id = %entry.execution_id, "Cached execution has no cached results");
                }
                cached
            }
            QueryState::Failed | QueryState::Cancelled => settings.reuse_failed,
            QueryState::Queued | QueryState::Running => false,
        };
        if !usable {
            return Ok(None);
        }

        info!(
            execution_id = %entry.execution_id,
            state = %entry.state(),
            uri = %local.uri(),
            "Using locally cached execution"
        );
        Ok(Some(QueryHandle::new(
            self.clone(),
            entry.execution_id.clone(),
            Origin::CachedLocal,
            Some(prepared.fingerprint.clone()),
            settings.clone(),
            cancel.clone(),
            Some(entry),
        )))
    }

    async fn lookup_remote(
        &self,
        prepared: &PreparedQuery,
        settings: &HandleSettings,
        cancel: &CancellationToken,
    ) -> Result<Option<QueryHandle>> {
        let Some(remote) = &self.remote else {
            return Ok(None);
        };
        let Some(execution_id) = remote.get(&prepared.fingerprint).await? else {
            return Ok(None);
        };

        let mut known = None;
        if !settings.reuse_failed {
            let info = self.service.get_status(&execution_id).await?;
            if matches!(info.state, QueryState::Failed | QueryState::Cancelled) {
                info!(
                    execution_id = %execution_id,
                    state = %info.state,
                    "Ignoring unsuccessful cached execution"
                );
                return Ok(None);
            }
            if info.finished() {
                known = Some(LocalEntry::new(info));
            }
        }

        info!(execution_id = %execution_id, uri = %remote.uri(), "Attaching to remotely cached execution");
        Ok(Some(QueryHandle::new(
            self.clone(),
            execution_id,
            Origin::CachedRemote,
            Some(prepared.fingerprint.clone()),
            settings.clone(),
            cancel.clone(),
            known,
        )))
    }

    /// Polls until the execution reaches a terminal state.
    ///
    /// Returns `None` if `cancel` fires first.
    pub(crate) async fn poll(
        &self,
        execution_id: &ExecutionId,
        polling: &PollingConfig,
        cancel: &CancellationToken,
    ) -> Result<Option<QueryInfo>> {
        let mut backoff = Backoff::new(polling.initial_delay(), polling.max_delay());
        loop {
            let info = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                status = self.service.get_status(execution_id) => status?,
            };
            if info.finished() {
                info!(execution_id = %execution_id, "{}", info);
                return Ok(Some(info));
            }

            let delay = backoff.next().unwrap_or_else(|| polling.max_delay());
            debug!(execution_id = %execution_id, state = %info.state, ?delay, "Waiting for query");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Downloads and decodes the results of a finished execution.
    pub(crate) async fn fetch_results(&self, execution_id: &ExecutionId) -> Result<QueryResults> {
        let raw = self.service.fetch_results(execution_id).await?;
        debug!(execution_id = %execution_id, rows = raw.rows.len(), "Fetched results");
        QueryResults::from_raw(raw)
    }
}
