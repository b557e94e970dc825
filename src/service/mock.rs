//! Mock query service for testing.
//!
//! Provides an in-memory service whose executions follow a scripted
//! sequence of states, and which records every request it receives.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    ColumnMetadata, ExecutionId, QueryInfo, QueryService, QueryState, QueryTarget, RawResultSet,
};
use crate::error::{QuarryError, Result};

const SUBMIT: &str = "StartQueryExecution";
const STATUS: &str = "GetQueryExecution";
const CANCEL: &str = "StopQueryExecution";
const RESULTS: &str = "GetQueryResults";

/// One execution known to the mock.
#[derive(Debug, Clone)]
pub struct MockExecution {
    pub sql: String,
    pub target: QueryTarget,
    /// States returned by successive status requests before `final_state`.
    pub pending: VecDeque<QueryState>,
    pub final_state: QueryState,
    pub state_reason: Option<String>,
    pub results: RawResultSet,
    pub cancelled: bool,
}

impl MockExecution {
    /// Creates an execution that has already succeeded with the given results.
    pub fn succeeded(sql: impl Into<String>, results: RawResultSet) -> Self {
        Self {
            sql: sql.into(),
            target: QueryTarget::default(),
            pending: VecDeque::new(),
            final_state: QueryState::Succeeded,
            state_reason: None,
            results,
            cancelled: false,
        }
    }

    /// Creates an execution that has already failed with the given reason.
    pub fn failed(sql: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            final_state: QueryState::Failed,
            state_reason: Some(reason.into()),
            ..Self::succeeded(sql, RawResultSet::default())
        }
    }

    fn current_state(&mut self) -> QueryState {
        if self.cancelled {
            return QueryState::Cancelled;
        }
        self.pending.pop_front().unwrap_or(self.final_state)
    }
}

#[derive(Debug, Default)]
struct MockState {
    executions: HashMap<ExecutionId, MockExecution>,
    log: Vec<String>,
    submitted: usize,
}

/// A mock query service returning scripted states and results.
///
/// Cloning shares the underlying state, so a test can keep a handle for
/// inspecting the request log after giving the service to a client.
#[derive(Debug, Clone)]
pub struct MockQueryService {
    state: Arc<Mutex<MockState>>,
    results: RawResultSet,
    pending: Vec<QueryState>,
    final_state: QueryState,
    state_reason: Option<String>,
    fail_cancel: bool,
    id_prefix: String,
}

impl MockQueryService {
    /// Creates a mock where every execution succeeds immediately with no rows.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            results: RawResultSet::default(),
            pending: Vec::new(),
            final_state: QueryState::Succeeded,
            state_reason: None,
            fail_cancel: false,
            id_prefix: "query".to_string(),
        }
    }

    /// Sets the raw results returned for new executions.
    pub fn with_results(mut self, results: RawResultSet) -> Self {
        self.results = results;
        self
    }

    /// Convenience for [`Self::with_results`] from borrowed literals.
    ///
    /// The service repeats column names as the first data row, the way
    /// real SELECT results arrive.
    pub fn with_rows(self, columns: &[(&str, &str)], rows: &[&[Option<&str>]]) -> Self {
        let columns: Vec<ColumnMetadata> = columns
            .iter()
            .map(|(name, data_type)| ColumnMetadata::new(*name, *data_type))
            .collect();
        let mut raw_rows = vec![columns.iter().map(|c| Some(c.name.clone())).collect()];
        raw_rows.extend(
            rows.iter()
                .map(|row| row.iter().map(|v| v.map(String::from)).collect()),
        );
        self.with_results(RawResultSet {
            columns,
            rows: raw_rows,
        })
    }

    /// Sets states reported by status requests before the final state.
    pub fn with_states(mut self, pending: impl IntoIterator<Item = QueryState>) -> Self {
        self.pending = pending.into_iter().collect();
        self
    }

    /// Makes new executions fail with the given reason.
    pub fn with_failure(mut self, reason: impl Into<String>) -> Self {
        self.final_state = QueryState::Failed;
        self.state_reason = Some(reason.into());
        self
    }

    /// Makes new executions run until cancelled.
    pub fn hanging(mut self) -> Self {
        self.final_state = QueryState::Running;
        self
    }

    /// Makes cancel requests fail with a service error.
    pub fn with_failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    /// Sets the prefix of generated execution ids (`<prefix>-<n>`).
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Registers an execution under a fixed id, as if submitted earlier.
    pub fn insert_execution(&self, execution_id: impl Into<ExecutionId>, execution: MockExecution) {
        self.lock().executions.insert(execution_id.into(), execution);
    }

    /// Returns the names of all requests received, in order.
    pub fn request_log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Returns how many requests with the given name were received.
    pub fn count(&self, request: &str) -> usize {
        self.lock().log.iter().filter(|r| *r == request).count()
    }

    /// Number of submissions received.
    pub fn submissions(&self) -> usize {
        self.count(SUBMIT)
    }

    /// Number of cancel requests received.
    pub fn cancellations(&self) -> usize {
        self.count(CANCEL)
    }

    /// Returns the SQL submitted for the given execution.
    pub fn submitted_sql(&self, execution_id: &ExecutionId) -> Option<String> {
        self.lock().executions.get(execution_id).map(|e| e.sql.clone())
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn not_found(execution_id: &ExecutionId) -> QuarryError {
        QuarryError::service(format!("execution {execution_id} not found"))
    }
}

impl Default for MockQueryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn submit(&self, sql: &str, target: &QueryTarget) -> Result<ExecutionId> {
        let mut state = self.lock();
        state.log.push(SUBMIT.to_string());
        state.submitted += 1;
        let execution_id = ExecutionId::new(format!("{}-{}", self.id_prefix, state.submitted));
        let execution = MockExecution {
            sql: sql.to_string(),
            target: target.clone(),
            pending: self.pending.iter().copied().collect(),
            final_state: self.final_state,
            state_reason: self.state_reason.clone(),
            results: self.results.clone(),
            cancelled: false,
        };
        state.executions.insert(execution_id.clone(), execution);
        Ok(execution_id)
    }

    async fn get_status(&self, execution_id: &ExecutionId) -> Result<QueryInfo> {
        let mut state = self.lock();
        state.log.push(STATUS.to_string());
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| Self::not_found(execution_id))?;

        let query_state = execution.current_state();
        let mut info = QueryInfo::new(execution_id.clone(), execution.sql.clone(), query_state);
        info.database = execution.target.database.clone();
        info.workgroup = execution.target.workgroup.clone();
        info.output_location = execution.target.output_location.clone();
        info.submitted_at = Some(Utc::now());
        info.state_reason = match query_state {
            QueryState::Cancelled => Some("Query was cancelled by user".to_string()),
            QueryState::Failed => execution.state_reason.clone(),
            _ => None,
        };
        if query_state.is_terminal() {
            info.completed_at = Some(Utc::now());
        }
        Ok(info)
    }

    async fn cancel(&self, execution_id: &ExecutionId) -> Result<()> {
        let mut state = self.lock();
        state.log.push(CANCEL.to_string());
        if self.fail_cancel {
            return Err(QuarryError::service("StopQueryExecution is not allowed"));
        }
        let execution = state
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| Self::not_found(execution_id))?;
        if !execution.final_state.is_terminal() || !execution.pending.is_empty() {
            execution.cancelled = true;
        }
        Ok(())
    }

    async fn fetch_results(&self, execution_id: &ExecutionId) -> Result<RawResultSet> {
        let mut state = self.lock();
        state.log.push(RESULTS.to_string());
        state
            .executions
            .get(execution_id)
            .map(|e| e.results.clone())
            .ok_or_else(|| Self::not_found(execution_id))
    }
}
