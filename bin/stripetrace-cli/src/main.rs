//! StripeTrace CLI - capture Lustre stripe records
//!
//! Queries the striping of each file, stores one record per file inside a
//! fixed memory budget, optionally reorders the records by rank and dumps
//! them.

mod output;
mod replay;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use stripetrace_common::{Rank, RuntimeConfig, SortOrder};
use stripetrace_runtime::{BatchReport, LustreIoctl, StripeQuery, StripeRuntime};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stripetrace")]
#[command(about = "Capture Lustre stripe layouts as compact records")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/stripetrace/stripetrace.toml")]
    config: String,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Memory budget for the record arena in bytes
    #[arg(short, long)]
    budget: Option<usize>,

    /// Rank assigned to files given without one
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    rank: i64,

    /// Reorder records by rank before printing
    #[arg(long)]
    reorder: bool,

    /// Reorder direction
    #[arg(long, value_enum)]
    order: Option<OrderArg>,

    /// Query files by name through their parent directory
    #[arg(long)]
    by_name: bool,

    /// Replay layouts from a TOML file instead of querying Lustre
    #[arg(long)]
    table: Option<PathBuf>,

    /// Print one JSON object per record
    #[arg(long)]
    json: bool,

    /// Files to record, as PATH or PATH=RANK
    files: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for SortOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Asc => Self::Ascending,
            OrderArg::Desc => Self::Descending,
        }
    }
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    runtime: RuntimeConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
struct LoggingConfig {
    #[serde(default = "default_log_level")]
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Split a `PATH=RANK` argument; anything without a numeric suffix is a path
fn parse_file_arg(arg: &str, default_rank: Rank) -> (PathBuf, Rank) {
    if let Some((path, rank)) = arg.rsplit_once('=')
        && let Ok(rank) = rank.parse::<i64>()
        && !path.is_empty()
    {
        return (PathBuf::from(path), Rank::new(rank));
    }
    (PathBuf::from(arg), default_rank)
}

fn load_config(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        return Ok(Config::default());
    }
    let config_str = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to parse config file: {e}");
        Config::default()
    }))
}

/// One-line outcome of a batch
fn batch_summary(report: &BatchReport) -> String {
    let mut line = format!(
        "Recorded {} files ({} skipped)",
        report.created.len(),
        report.skipped
    );
    if report.exhausted {
        line.push_str(", stopped at the memory budget");
    }
    line
}

fn ingest<Q: StripeQuery>(
    runtime: &mut StripeRuntime,
    query: &Q,
    files: Vec<(PathBuf, Rank)>,
) -> Result<BatchReport> {
    Ok(runtime.ingest_batch(query, files)?)
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file if it exists
    let config = load_config(&args.config)?;

    // Merge CLI args with config file (CLI takes precedence)
    let mut runtime_config = config.runtime;
    if let Some(budget) = args.budget {
        runtime_config.memory_budget = budget;
    }
    if let Some(order) = args.order {
        runtime_config.sort_order = order.into();
    }
    let log_level = if args.log_level == "warn" {
        config.logging.level
    } else {
        args.log_level
    };

    // Initialize logging; stdout carries the dump
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("Config file: {}", args.config);
    info!(
        "Memory budget: {} bytes, {:?} reorder",
        runtime_config.memory_budget, runtime_config.sort_order
    );

    let default_rank = Rank::new(args.rank);
    let mut files: Vec<(PathBuf, Rank)> = args
        .files
        .iter()
        .map(|arg| parse_file_arg(arg, default_rank))
        .collect();

    let mut runtime = StripeRuntime::new(runtime_config)?;
    let report = if let Some(table_path) = &args.table {
        let replay = replay::load(table_path)?;
        info!(
            "Replaying {} layouts from {}",
            replay.table.len(),
            table_path.display()
        );
        if files.is_empty() {
            files = replay.paths.into_iter().map(|p| (p, default_rank)).collect();
        }
        ingest(&mut runtime, &replay.table, files)?
    } else {
        let query = if args.by_name {
            LustreIoctl::by_name()
        } else {
            LustreIoctl::new()
        };
        ingest(&mut runtime, &query, files)?
    };

    info!(
        "{}, {} of {} bytes used",
        batch_summary(&report),
        runtime.bytes_used(),
        runtime.capacity()
    );

    if args.reorder {
        runtime.reorder_by_rank()?;
    }
    runtime.verify()?;

    let mut out = std::io::stdout().lock();
    if args.json {
        output::write_json(&mut out, &runtime)
    } else {
        output::write_text(&mut out, &runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripetrace_common::RecordId;

    #[test]
    fn test_parse_file_arg() {
        let default = Rank::new(7);
        assert_eq!(
            parse_file_arg("/lus/a", default),
            (PathBuf::from("/lus/a"), default)
        );
        assert_eq!(
            parse_file_arg("/lus/a=3", default),
            (PathBuf::from("/lus/a"), Rank::new(3))
        );
        assert_eq!(
            parse_file_arg("/lus/a=-1", default),
            (PathBuf::from("/lus/a"), Rank::new(-1))
        );
        assert_eq!(
            parse_file_arg("/lus/k=v", default),
            (PathBuf::from("/lus/k=v"), default)
        );
        assert_eq!(parse_file_arg("=4", default), (PathBuf::from("=4"), default));
    }

    #[test]
    fn test_batch_summary() {
        let mut report = BatchReport {
            created: vec![RecordId::new(0), RecordId::new(1)],
            skipped: 3,
            exhausted: false,
        };
        assert_eq!(batch_summary(&report), "Recorded 2 files (3 skipped)");

        report.exhausted = true;
        assert_eq!(
            batch_summary(&report),
            "Recorded 2 files (3 skipped), stopped at the memory budget"
        );
    }

    #[test]
    fn test_config_file() {
        let config: Config = toml::from_str(
            r#"
            [runtime]
            memory_budget = 4096
            sort_order = "descending"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.memory_budget, 4096);
        assert_eq!(config.runtime.sort_order, SortOrder::Descending);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.runtime, RuntimeConfig::default());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "stripetrace",
            "--budget",
            "1263",
            "--reorder",
            "--order",
            "desc",
            "/lus/a=1",
            "/lus/b",
        ])
        .unwrap();
        assert_eq!(args.budget, Some(1263));
        assert!(args.reorder);
        assert!(matches!(args.order, Some(OrderArg::Desc)));
        assert_eq!(args.files.len(), 2);
    }
}
