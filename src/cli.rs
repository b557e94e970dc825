//! Command-line argument parsing for Quarry.
//!
//! Uses clap to parse the subcommands of the `quarry` binary.

use std::io::Read;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use quarry::config::{ClientConfig, ConfigOverrides};
use quarry::error::{QuarryError, Result};
use quarry::sql::{Params, SqlParam};

/// Output format for commands that print structured data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON document.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Caching client for cloud SQL query services.
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Database to query
    #[arg(short = 'd', long, value_name = "DATABASE", global = true)]
    pub database: Option<String>,

    /// Workgroup to run queries in
    #[arg(short = 'w', long, value_name = "WORKGROUP", global = true)]
    pub workgroup: Option<String>,

    /// Use SQL verbatim instead of normalizing whitespace
    #[arg(long, global = true)]
    pub no_normalize: bool,

    /// Write logs to a file instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Output format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print normalized SQL
    Normalize {
        /// SQL text, or "-" to read stdin
        #[arg(value_name = "SQL")]
        sql: Option<String>,
    },

    /// Print SQL with parameters bound
    Bind(QueryArgs),

    /// Print the cache key of a query
    Fingerprint(QueryArgs),

    /// Inspect the caches
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Print the effective configuration
    Config,

    /// Run a query against the built-in mock service
    Run {
        #[command(flatten)]
        query: QueryArgs,

        /// Column of the mocked result, as NAME:TYPE
        #[arg(long = "column", value_name = "NAME:TYPE")]
        columns: Vec<String>,

        /// Row of the mocked result, as comma-separated values
        #[arg(long = "row", value_name = "VALUES")]
        rows: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show what the caches hold for a query
    Show(QueryArgs),
}

/// SQL and parameters of a query.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// SQL text, or "-" to read stdin
    #[arg(value_name = "SQL")]
    pub sql: Option<String>,

    /// Positional parameter, parsed as JSON when possible
    #[arg(short = 'p', long = "param", value_name = "VALUE")]
    pub params: Vec<String>,

    /// Named parameter, parsed as JSON when possible
    #[arg(short = 'n', long = "named", value_name = "NAME=VALUE")]
    pub named: Vec<String>,
}

impl QueryArgs {
    /// Returns the SQL text, reading stdin if needed.
    pub fn sql(&self) -> Result<String> {
        read_sql(self.sql.as_deref())
    }

    /// Builds the parameters.
    pub fn params(&self) -> Result<Params> {
        if !self.params.is_empty() && !self.named.is_empty() {
            return Err(QuarryError::parameter(
                "Cannot mix --param and --named parameters",
            ));
        }
        if !self.named.is_empty() {
            let pairs = self
                .named
                .iter()
                .map(|arg| {
                    let (name, value) = arg.split_once('=').ok_or_else(|| {
                        QuarryError::parameter(format!("Expected NAME=VALUE, got '{arg}'"))
                    })?;
                    Ok((name.to_string(), parse_param(value)?))
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Params::named(pairs));
        }
        if self.params.is_empty() {
            return Ok(Params::None);
        }
        let values = self
            .params
            .iter()
            .map(|value| parse_param(value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Params::Positional(values))
    }
}

/// Parses a parameter as JSON, falling back to a plain string.
fn parse_param(value: &str) -> Result<SqlParam> {
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(json) => SqlParam::try_from(json),
        Err(_) => Ok(SqlParam::from(value)),
    }
}

/// Returns `sql`, or stdin when it is absent or "-".
pub fn read_sql(sql: Option<&str>) -> Result<String> {
    match sql {
        Some(sql) if sql != "-" => Ok(sql.to_string()),
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| QuarryError::internal(format!("Failed to read stdin: {e}")))?;
            Ok(buffer)
        }
    }
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(ClientConfig::default_path)
    }

    /// Returns the configuration changes requested on the command line.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            database: self.database.clone(),
            workgroup: self.workgroup.clone(),
            normalize: self.no_normalize.then_some(false),
            ..ConfigOverrides::default()
        }
    }
}
