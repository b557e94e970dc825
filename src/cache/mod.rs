//! Two-tier execution cache.
//!
//! The local cache keeps execution records and serialized results, so a hit
//! needs no remote call at all. The remote cache only maps fingerprints to
//! execution ids; it is meant to be shared between machines and lets a
//! client attach to an execution that someone else already ran.

mod local;
mod remote;

pub use local::LocalCache;
pub use remote::RemoteCache;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{QuarryError, QueryFailure, Result};
use crate::service::{ExecutionId, QueryInfo, QueryState, QueryTarget};
use crate::sql::Params;

/// Cache key identifying a logical query.
///
/// Hex encoded SHA-256 of the SQL template, the parameter literals and the
/// target database and workgroup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

#[derive(Serialize)]
struct FingerprintInput<'a> {
    sql: &'a str,
    parameters: Vec<(Option<String>, String)>,
    database: Option<&'a str>,
    workgroup: Option<&'a str>,
}

impl Fingerprint {
    /// Computes the fingerprint of a query.
    ///
    /// `sql` is the template as it will be bound, after normalization if
    /// that is enabled. Fails if a parameter has no literal form.
    pub fn compute(sql: &str, params: &Params, target: &QueryTarget) -> Result<Self> {
        let input = FingerprintInput {
            sql,
            parameters: params.literals()?,
            database: target.database.as_deref(),
            workgroup: target.workgroup.as_deref(),
        };
        let canonical = serde_json::to_vec(&input)
            .map_err(|e| QuarryError::internal(format!("Failed to encode fingerprint: {e}")))?;
        Ok(Self(hex::encode(Sha256::digest(&canonical))))
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the local execution record.
    pub fn execution_key(&self) -> String {
        format!("execution-{}.json", self.0)
    }

    /// Key of the remote execution id.
    pub fn query_key(&self) -> String {
        format!("query-{}", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of the serialized results of an execution.
pub fn results_key(execution_id: &ExecutionId) -> String {
    format!("results-{execution_id}.csv")
}

/// Execution record kept in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEntry {
    pub execution_id: ExecutionId,
    pub info: QueryInfo,
    #[serde(default)]
    pub failure: Option<QueryFailure>,
}

impl LocalEntry {
    /// Creates a record for a finished execution.
    pub fn new(info: QueryInfo) -> Self {
        let failure = (info.state == QueryState::Failed).then(|| {
            QueryFailure::new(info.execution_id.clone(), info.state_reason.clone())
        });
        Self {
            execution_id: info.execution_id.clone(),
            info,
            failure,
        }
    }

    /// Returns the state of the recorded execution.
    pub fn state(&self) -> QueryState {
        self.info.state
    }

    /// Returns the error a failed or cancelled execution raises.
    pub fn check(&self) -> Result<()> {
        match &self.failure {
            Some(failure) => Err(QuarryError::QueryFailed(failure.clone())),
            None => self.info.check(),
        }
    }
}
