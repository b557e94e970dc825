//! Error types for Quarry.
//!
//! Defines the main error enum used throughout the crate, plus the
//! classification of failed remote executions.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::service::ExecutionId;

/// Boxed error used to carry transport and storage failures unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for Quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// Placeholder/value mismatch or a value with no SQL literal form.
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// The service declared a column type that has no native mapping.
    #[error("Type mapping error: unsupported column type '{column_type}'")]
    TypeMapping { column_type: String },

    /// Raw row data does not match the declared columns.
    #[error("Result decoding error at row {row}, column {column}: {message}")]
    ResultDecoding {
        row: usize,
        column: usize,
        message: String,
    },

    /// The remote execution reached the FAILED state.
    #[error("{0}")]
    QueryFailed(QueryFailure),

    /// The remote execution reached the CANCELLED state.
    #[error("Query {execution_id} cancelled{}", reason_suffix(.state_reason))]
    QueryCancelled {
        execution_id: ExecutionId,
        state_reason: Option<String>,
    },

    /// Waiting was interrupted by the caller's cancellation token.
    #[error("Query {execution_id} interrupted")]
    Interrupted { execution_id: ExecutionId },

    /// Failure reported by the remote query service transport.
    #[error("Service error: {0}")]
    Service(#[source] BoxError),

    /// Failure reported by a storage backend.
    #[error("Storage error at {uri}: {source}")]
    Storage {
        uri: String,
        #[source]
        source: BoxError,
    },

    /// Configuration errors (invalid config file, bad environment values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

impl QuarryError {
    /// Creates a parameter error with the given message.
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::Parameter(msg.into())
    }

    /// Creates a type mapping error for the given declared type.
    pub fn type_mapping(column_type: impl Into<String>) -> Self {
        Self::TypeMapping {
            column_type: column_type.into(),
        }
    }

    /// Creates a decoding error pointing at a cell of the result set.
    pub fn decoding(row: usize, column: usize, msg: impl Into<String>) -> Self {
        Self::ResultDecoding {
            row,
            column,
            message: msg.into(),
        }
    }

    /// Wraps a transport error from the remote query service.
    pub fn service(err: impl Into<BoxError>) -> Self {
        Self::Service(err.into())
    }

    /// Wraps an error raised by the storage at `uri`.
    pub fn storage(uri: impl Into<String>, err: impl Into<BoxError>) -> Self {
        Self::Storage {
            uri: uri.into(),
            source: err.into(),
        }
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Parameter(_) => "Parameter Error",
            Self::TypeMapping { .. } => "Type Mapping Error",
            Self::ResultDecoding { .. } => "Result Decoding Error",
            Self::QueryFailed(_) => "Query Failed",
            Self::QueryCancelled { .. } => "Query Cancelled",
            Self::Interrupted { .. } => "Interrupted",
            Self::Service(_) => "Service Error",
            Self::Storage { .. } => "Storage Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the failure details if this is a failed execution.
    pub fn as_failure(&self) -> Option<&QueryFailure> {
        match self {
            Self::QueryFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Well-known causes of a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DatabaseNotFound,
    TableNotFound,
    Syntax,
    Other,
}

impl FailureKind {
    /// Classifies a failure from the reason text reported by the service.
    pub fn classify(reason: Option<&str>) -> Self {
        static DATABASE: OnceLock<Regex> = OnceLock::new();
        static TABLE: OnceLock<Regex> = OnceLock::new();
        static SYNTAX: OnceLock<Regex> = OnceLock::new();

        let Some(reason) = reason else {
            return Self::Other;
        };

        let database = DATABASE.get_or_init(|| {
            Regex::new(r"(?i)SCHEMA_NOT_FOUND|(schema|database) '?[^']*'? (does not exist|not found)")
                .expect("valid regex")
        });
        let table = TABLE.get_or_init(|| {
            Regex::new(r"(?i)TABLE_NOT_FOUND|table '?[^']*'? (does not exist|not found)")
                .expect("valid regex")
        });
        let syntax = SYNTAX.get_or_init(|| {
            Regex::new(r"(?i)SYNTAX_ERROR|mismatched input|extraneous input").expect("valid regex")
        });

        if database.is_match(reason) {
            Self::DatabaseNotFound
        } else if table.is_match(reason) {
            Self::TableNotFound
        } else if syntax.is_match(reason) {
            Self::Syntax
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DatabaseNotFound => write!(f, "database not found"),
            Self::TableNotFound => write!(f, "table not found"),
            Self::Syntax => write!(f, "syntax error"),
            Self::Other => write!(f, "failed"),
        }
    }
}

/// Details of a failed remote execution.
///
/// Both the raw reason text and its classification are kept so a failure
/// restored from the cache is as specific as the original one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub execution_id: ExecutionId,
    pub state_reason: Option<String>,
    pub kind: FailureKind,
}

impl QueryFailure {
    /// Creates a failure, classifying the reason text.
    pub fn new(execution_id: ExecutionId, state_reason: Option<String>) -> Self {
        let kind = FailureKind::classify(state_reason.as_deref());
        Self {
            execution_id,
            state_reason,
            kind,
        }
    }
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query {} failed", self.execution_id)?;
        if self.kind != FailureKind::Other {
            write!(f, " ({})", self.kind)?;
        }
        if let Some(reason) = &self.state_reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

/// Result type alias using QuarryError.
pub type Result<T> = std::result::Result<T, QuarryError>;
