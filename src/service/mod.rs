//! Remote query service abstraction for Quarry.
//!
//! Provides a trait-based interface to the cloud SQL service so the
//! lifecycle controller never depends on a concrete transport.

mod info;
mod mock;

pub use info::{format_price, format_size, format_time, QueryInfo, QueryState};
pub use mock::{MockExecution, MockQueryService};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque identifier assigned by the remote service to one submitted run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Wraps an identifier returned by the service.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ExecutionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where a query runs and where the service writes its output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTarget {
    /// Database (catalog schema) queried when SQL does not qualify tables.
    pub database: Option<String>,

    /// Workgroup that carries resource limits and a default output location.
    pub workgroup: Option<String>,

    /// Blob storage URI for query output.
    pub output_location: Option<String>,
}

/// Column metadata as declared by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column name.
    pub name: String,

    /// Declared column type, e.g. `varchar` or `decimal(10,2)`.
    pub data_type: String,
}

impl ColumnMetadata {
    /// Creates column metadata with the given name and declared type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A raw cell: every value is transmitted as text, `None` is SQL NULL.
pub type RawValue = Option<String>;

/// A raw row as transmitted by the service.
pub type RawRow = Vec<RawValue>;

/// Undecoded result set returned by [`QueryService::fetch_results`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResultSet {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<RawRow>,
}

/// Trait defining the remote query service.
///
/// Implementations wrap a transport; errors from it should be passed
/// through [`crate::error::QuarryError::service`] without reinterpretation.
#[async_trait]
pub trait QueryService: Send + Sync + fmt::Debug {
    /// Starts a new execution and returns its id.
    async fn submit(&self, sql: &str, target: &QueryTarget) -> Result<ExecutionId>;

    /// Fetches the current status of an execution.
    async fn get_status(&self, execution_id: &ExecutionId) -> Result<QueryInfo>;

    /// Asks the service to stop an execution. Does not wait for it to stop.
    async fn cancel(&self, execution_id: &ExecutionId) -> Result<()>;

    /// Downloads the raw results of a finished execution.
    async fn fetch_results(&self, execution_id: &ExecutionId) -> Result<RawResultSet>;
}
