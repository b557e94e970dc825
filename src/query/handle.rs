//! Handles to submitted, cached or attached executions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::controller::QueryController;
use crate::cache::{Fingerprint, LocalEntry};
use crate::config::{ClientConfig, PollingConfig};
use crate::error::{QuarryError, Result};
use crate::results::QueryResults;
use crate::service::{ExecutionId, QueryInfo, QueryState};

/// Where a handle's execution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Execution record found in the local cache.
    CachedLocal,
    /// Execution id found in the remote cache.
    CachedRemote,
    /// Newly submitted execution.
    Submitted,
    /// Execution looked up by id.
    Attached,
}

/// Cache and interrupt behavior captured when the handle is created.
#[derive(Debug, Clone)]
pub(crate) struct HandleSettings {
    pub(crate) read_results: bool,
    pub(crate) write_results: bool,
    pub(crate) write_entry: bool,
    pub(crate) reuse_failed: bool,
    pub(crate) kill_on_interrupt: bool,
    pub(crate) polling: PollingConfig,
}

impl HandleSettings {
    pub(crate) fn for_query(config: &ClientConfig, cacheable: bool) -> Self {
        Self {
            read_results: cacheable && config.cache.reads(),
            write_results: cacheable && config.cache.writes(),
            write_entry: cacheable && config.cache.writes(),
            reuse_failed: config.cache.reuse_failed,
            kill_on_interrupt: config.query.kill_on_interrupt,
            polling: config.polling.clone(),
        }
    }

    pub(crate) fn for_attached(config: &ClientConfig) -> Self {
        Self {
            read_results: config.cache.reads(),
            write_results: config.cache.writes(),
            write_entry: false,
            reuse_failed: config.cache.reuse_failed,
            kill_on_interrupt: config.query.kill_on_interrupt,
            polling: config.polling.clone(),
        }
    }
}

/// Handle to one remote execution.
///
/// Cheap to clone; clones share the memoized state and results.
#[derive(Debug, Clone)]
pub struct QueryHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    controller: QueryController,
    execution_id: ExecutionId,
    origin: Origin,
    fingerprint: Option<Fingerprint>,
    settings: HandleSettings,
    cancel: CancellationToken,
    finished: Mutex<Option<LocalEntry>>,
    results: OnceCell<QueryResults>,
    cancel_sent: AtomicBool,
}

impl QueryHandle {
    pub(crate) fn new(
        controller: QueryController,
        execution_id: ExecutionId,
        origin: Origin,
        fingerprint: Option<Fingerprint>,
        settings: HandleSettings,
        cancel: CancellationToken,
        finished: Option<LocalEntry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                controller,
                execution_id,
                origin,
                fingerprint,
                settings,
                cancel,
                finished: Mutex::new(finished),
                results: OnceCell::new(),
                cancel_sent: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the execution id.
    pub fn execution_id(&self) -> &ExecutionId {
        &self.inner.execution_id
    }

    /// Returns where the execution came from.
    pub fn origin(&self) -> Origin {
        self.inner.origin
    }

    /// Returns the cache key, unless the handle was attached by id.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.inner.fingerprint.as_ref()
    }

    /// Token that interrupts [`join`](Self::join) and
    /// [`get_results`](Self::get_results) when cancelled.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Returns the current status of the execution.
    ///
    /// Once a terminal state has been seen it is returned without further
    /// requests.
    pub async fn get_info(&self) -> Result<QueryInfo> {
        if let Some(entry) = self.finished() {
            return Ok(entry.info);
        }
        let info = self
            .inner
            .controller
            .service()
            .get_status(&self.inner.execution_id)
            .await?;
        if info.finished() {
            self.remember(info.clone());
        }
        Ok(info)
    }

    /// Waits for the execution to finish.
    ///
    /// Fails with the execution's error if it failed or was cancelled, and
    /// with [`QuarryError::Interrupted`] if the cancellation token fires
    /// first.
    pub async fn join(&self) -> Result<QueryInfo> {
        let entry = match self.finished() {
            Some(entry) => entry,
            None => {
                let polled = self
                    .inner
                    .controller
                    .poll(
                        &self.inner.execution_id,
                        &self.inner.settings.polling,
                        &self.inner.cancel,
                    )
                    .await?;
                let Some(info) = polled else {
                    return Err(self.interrupt().await);
                };
                let entry = self.remember(info);
                self.record_failure(&entry).await?;
                entry
            }
        };
        entry.check()?;
        Ok(entry.info)
    }

    /// Waits for the execution and returns its results.
    ///
    /// Results are read from the local cache when present, otherwise
    /// downloaded and written through to it.
    pub async fn get_results(&self) -> Result<QueryResults> {
        self.inner
            .results
            .get_or_try_init(|| self.load_results())
            .await
            .cloned()
    }

    /// Asks the service to stop the execution.
    pub async fn kill(&self) -> Result<()> {
        self.inner.cancel_sent.store(true, Ordering::SeqCst);
        self.inner
            .controller
            .service()
            .cancel(&self.inner.execution_id)
            .await?;
        info!(execution_id = %self.inner.execution_id, "Cancelled query");
        Ok(())
    }

    /// Handles an interrupt: cancels the execution at most once, if
    /// configured to, and returns the error to raise.
    pub(crate) async fn interrupt(&self) -> QuarryError {
        let execution_id = &self.inner.execution_id;
        if self.inner.settings.kill_on_interrupt
            && !self.inner.cancel_sent.swap(true, Ordering::SeqCst)
        {
            info!(execution_id = %execution_id, "Interrupted, cancelling query");
            if let Err(e) = self.inner.controller.service().cancel(execution_id).await {
                warn!(execution_id = %execution_id, "Failed to cancel query: {}", e);
            }
        } else {
            info!(execution_id = %execution_id, "Interrupted");
        }
        QuarryError::Interrupted {
            execution_id: execution_id.clone(),
        }
    }

    async fn load_results(&self) -> Result<QueryResults> {
        let info = self.join().await?;
        let execution_id = &self.inner.execution_id;

        if self.inner.settings.read_results {
            if let Some(local) = self.inner.controller.local() {
                if let Some(results) = local.get_results(execution_id).await? {
                    debug!(execution_id = %execution_id, "Using locally cached results");
                    self.store(&info, None).await?;
                    return Ok(results);
                }
            }
        }

        let results = self.inner.controller.fetch_results(execution_id).await?;
        self.store(&info, Some(&results)).await?;
        Ok(results)
    }

    /// Writes results and the execution record through to the local cache.
    async fn store(&self, info: &QueryInfo, results: Option<&QueryResults>) -> Result<()> {
        let Some(local) = self.inner.controller.local() else {
            return Ok(());
        };
        let settings = &self.inner.settings;
        let execution_id = &self.inner.execution_id;

        if let Some(results) = results {
            if settings.write_results && !local.has_results(execution_id).await? {
                local.put_results(execution_id, results).await?;
            }
        }
        if settings.write_entry && self.inner.origin != Origin::CachedLocal {
            if let Some(fingerprint) = &self.inner.fingerprint {
                local.put(fingerprint, &LocalEntry::new(info.clone())).await?;
            }
        }
        Ok(())
    }

    async fn record_failure(&self, entry: &LocalEntry) -> Result<()> {
        let settings = &self.inner.settings;
        if entry.state() == QueryState::Succeeded
            || !settings.reuse_failed
            || !settings.write_entry
            || self.inner.origin == Origin::CachedLocal
        {
            return Ok(());
        }
        if let (Some(local), Some(fingerprint)) =
            (self.inner.controller.local(), &self.inner.fingerprint)
        {
            local.put(fingerprint, entry).await?;
            info!(execution_id = %entry.execution_id, state = %entry.state(), "Cached unsuccessful execution");
        }
        Ok(())
    }

    fn finished(&self) -> Option<LocalEntry> {
        self.lock().clone()
    }

    fn remember(&self, info: QueryInfo) -> LocalEntry {
        let entry = LocalEntry::new(info);
        *self.lock() = Some(entry.clone());
        entry
    }

    fn lock(&self) -> MutexGuard<'_, Option<LocalEntry>> {
        self.inner
            .finished
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
