//! Quarry - a caching client for cloud SQL query services.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{CacheCommand, Cli, Command, OutputFormat, QueryArgs};
use quarry::cache::{LocalCache, LocalEntry, RemoteCache};
use quarry::query::{PreparedQuery, QueryController};
use quarry::service::{ColumnMetadata, ExecutionId, MockQueryService, RawResultSet, RawRow};
use quarry::storage::storage_from_uri;
use quarry::{logging, Client, ClientConfig, QuarryError, QueryResults, Value};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<QuarryError>() {
            Some(quarry_error) => error!("{}: {:#}", quarry_error.category(), e),
            None => error!("{:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    debug!("Loading config from: {}", config_path.display());
    let config = ClientConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?
        .with_overrides(&cli.overrides());

    match &cli.command {
        Command::Normalize { sql } => {
            let sql = cli::read_sql(sql.as_deref())?;
            println!("{}", quarry::sql::normalize_sql(&sql));
        }
        Command::Bind(args) => {
            println!("{}", prepare(args, &config)?.sql);
        }
        Command::Fingerprint(args) => {
            println!("{}", prepare(args, &config)?.fingerprint);
        }
        Command::Cache {
            command: CacheCommand::Show(args),
        } => show_cache(args, &config, cli.output).await?,
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
        Command::Run {
            query,
            columns,
            rows,
        } => run_mock(query, columns, rows, config, cli.output).await?,
    }

    Ok(())
}

fn prepare(args: &QueryArgs, config: &ClientConfig) -> Result<PreparedQuery> {
    let sql = args.sql()?;
    let params = args.params()?;
    Ok(QueryController::prepare(&sql, &params, config)?)
}

/// What the caches hold for one query.
#[derive(Debug, Serialize)]
struct CacheReport {
    fingerprint: String,
    cacheable: bool,
    local: Option<LocalEntry>,
    local_results: bool,
    remote: Option<ExecutionId>,
}

async fn show_cache(args: &QueryArgs, config: &ClientConfig, output: OutputFormat) -> Result<()> {
    let prepared = prepare(args, config)?;

    let local = config
        .cache
        .local
        .as_deref()
        .map(storage_from_uri)
        .transpose()?
        .map(LocalCache::new);
    let remote = config
        .cache
        .remote
        .as_deref()
        .map(storage_from_uri)
        .transpose()?
        .map(RemoteCache::new);

    let local_lookup = async {
        let Some(cache) = &local else {
            return Ok::<_, QuarryError>((None, false));
        };
        match cache.get(&prepared.fingerprint).await? {
            Some(entry) => {
                let cached = cache.has_results(&entry.execution_id).await?;
                Ok((Some(entry), cached))
            }
            None => Ok((None, false)),
        }
    };
    let remote_lookup = async {
        match &remote {
            Some(cache) => cache.get(&prepared.fingerprint).await,
            None => Ok(None),
        }
    };
    let ((entry, local_results), remote_id) = futures::try_join!(local_lookup, remote_lookup)?;

    let report = CacheReport {
        fingerprint: prepared.fingerprint.to_string(),
        cacheable: prepared.cacheable,
        local: entry,
        local_results,
        remote: remote_id,
    };

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("fingerprint: {}", report.fingerprint);
            println!("cacheable:   {}", report.cacheable);
            match (&local, &report.local) {
                (None, _) => println!("local:       not configured"),
                (Some(_), None) => println!("local:       miss"),
                (Some(_), Some(entry)) => {
                    println!("local:       {} ({})", entry.execution_id, entry.info);
                    println!("results:     {}", if local_results { "cached" } else { "missing" });
                }
            }
            match (&remote, &report.remote) {
                (None, _) => println!("remote:      not configured"),
                (Some(_), None) => println!("remote:      miss"),
                (Some(_), Some(id)) => println!("remote:      {id}"),
            }
        }
    }
    Ok(())
}

/// Runs a query against a mock service returning the given rows.
async fn run_mock(
    args: &QueryArgs,
    columns: &[String],
    rows: &[String],
    config: ClientConfig,
    output: OutputFormat,
) -> Result<()> {
    let columns = columns
        .iter()
        .map(|column| {
            let (name, data_type) = column.split_once(':').unwrap_or((column.as_str(), "varchar"));
            ColumnMetadata::new(name, data_type)
        })
        .collect::<Vec<_>>();
    let mut raw_rows: Vec<RawRow> = vec![columns.iter().map(|c| Some(c.name.clone())).collect()];
    raw_rows.extend(rows.iter().map(|row| {
        row.split(',')
            .map(|value| (value != "NULL").then(|| value.to_string()))
            .collect::<RawRow>()
    }));

    // Ids must not collide with executions cached by earlier runs.
    let service = MockQueryService::new()
        .with_id_prefix(format!("local-{}", Utc::now().timestamp_millis()))
        .with_results(RawResultSet {
            columns,
            rows: raw_rows,
        });

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received");
                cancel.cancel();
            }
        }
    });

    let client = Client::new(Arc::new(service), config)?.with_cancellation(cancel);
    let handle = client.submit(&args.sql()?, args.params()?).await?;
    let results = handle.get_results().await?;
    info!(
        execution_id = %handle.execution_id(),
        origin = ?handle.origin(),
        rows = results.len(),
        "Query finished"
    );

    print_results(&results, output)?;
    Ok(())
}

fn print_results(results: &QueryResults, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => {
            println!("{}", results.column_names().join("\t"));
            for row in results {
                let cells: Vec<String> = row.iter().map(Value::to_display_string).collect();
                println!("{}", cells.join("\t"));
            }
        }
        OutputFormat::Json => {
            let names = results.column_names();
            let rows: Vec<serde_json::Map<String, serde_json::Value>> = results
                .iter()
                .map(|row| {
                    names
                        .iter()
                        .zip(row)
                        .map(|(name, value)| (name.to_string(), to_json(value)))
                        .collect()
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Json(json) => json.clone(),
        other => serde_json::Value::String(other.to_display_string()),
    }
}
