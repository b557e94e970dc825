//! Execution status snapshots.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ExecutionId;
use crate::error::{QuarryError, QueryFailure, Result};

/// Price in dollars per terabyte scanned.
const PRICE_PER_TB: f64 = 5.0;

const UNIT_PREFIXES: [&str; 4] = ["k", "M", "G", "T"];

/// Execution state reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// Returns the state as the service spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a state string as reported by the service.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true once the state can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an execution, as returned by one status request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryInfo {
    pub execution_id: ExecutionId,
    pub sql: String,
    pub state: QueryState,
    #[serde(default)]
    pub state_reason: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub workgroup: Option<String>,
    #[serde(default)]
    pub output_location: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scanned_bytes: u64,
    #[serde(default, with = "duration_millis")]
    pub execution_time: Duration,
}

impl QueryInfo {
    /// Creates a snapshot with the given state and no statistics.
    pub fn new(execution_id: ExecutionId, sql: impl Into<String>, state: QueryState) -> Self {
        Self {
            execution_id,
            sql: sql.into(),
            state,
            state_reason: None,
            database: None,
            workgroup: None,
            output_location: None,
            submitted_at: None,
            completed_at: None,
            scanned_bytes: 0,
            execution_time: Duration::ZERO,
        }
    }

    /// Returns true if the execution reached a terminal state.
    pub fn finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns true if the execution succeeded.
    pub fn succeeded(&self) -> bool {
        self.state == QueryState::Succeeded
    }

    /// Approximate price in dollars, based on bytes scanned.
    pub fn approx_price(&self) -> f64 {
        PRICE_PER_TB * self.scanned_bytes as f64 / 1e12
    }

    /// Converts a finished, unsuccessful execution into its error.
    pub fn check(&self) -> Result<()> {
        match self.state {
            QueryState::Failed => Err(QuarryError::QueryFailed(QueryFailure::new(
                self.execution_id.clone(),
                self.state_reason.clone(),
            ))),
            QueryState::Cancelled => Err(QuarryError::QueryCancelled {
                execution_id: self.execution_id.clone(),
                state_reason: self.state_reason.clone(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for QueryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, scanned {} in {}, approx. price {}",
            self.state,
            format_size(self.scanned_bytes as f64),
            format_time(self.execution_time),
            format_price(self.approx_price())
        )
    }
}

/// Formats a price in dollars, switching to cents below one dollar.
pub fn format_price(v: f64) -> String {
    if v > 1.0 {
        format!("${v:.2}")
    } else {
        format!("{:.2}¢", 100.0 * v)
    }
}

/// Formats a size in bytes, assuming 1kB = 1000B.
pub fn format_size(v: f64) -> String {
    if v < 1000.0 {
        return format!("{v:.0}B");
    }
    let mut v = v;
    let mut unit = UNIT_PREFIXES[0];
    for prefix in UNIT_PREFIXES {
        v /= 1000.0;
        unit = prefix;
        if v < 1000.0 {
            break;
        }
    }
    format!("{v:.2}{unit}B")
}

/// Formats a duration as seconds below one minute, minutes above.
pub fn format_time(v: Duration) -> String {
    if v < Duration::from_secs(60) {
        return format!("{:.1}s", v.as_secs_f64());
    }
    let secs = v.as_secs();
    format!("{}min {}s", secs / 60, secs % 60)
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
