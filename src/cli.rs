//! Command-line interface for datadiff

use clap::Parser;

use crate::{
    DEFAULT_BISECTION_FACTOR, DEFAULT_BISECTION_THRESHOLD, DEFAULT_MAX_THREADS,
    DEFAULT_UPDATE_COLUMN,
};

#[derive(Parser, Debug)]
#[command(name = "datadiff")]
#[command(about = "Compare one table across two databases and report differing rows")]
#[command(version)]
pub struct Cli {
    /// Source account (server host for remote drivers)
    #[arg(long = "sourceAccount")]
    pub source_account: Option<String>,

    /// Source user name
    #[arg(long = "sourceUser")]
    pub source_user: Option<String>,

    /// Source password, or an {ENV_VAR} placeholder
    #[arg(long = "sourcePassword")]
    pub source_password: Option<String>,

    /// Target account (server host for remote drivers)
    #[arg(long = "targetAccount")]
    pub target_account: Option<String>,

    /// Target user name
    #[arg(long = "targetUser")]
    pub target_user: Option<String>,

    /// Target password, or an {ENV_VAR} placeholder
    #[arg(long = "targetPassword")]
    pub target_password: Option<String>,

    /// Role applied on both sides
    #[arg(long)]
    pub role: Option<String>,

    /// Compute warehouse name
    #[arg(long)]
    pub warehouse: Option<String>,

    /// Database name (a file path or ":memory:" for the duckdb driver)
    #[arg(long)]
    pub database: String,

    /// Schema holding the table
    #[arg(long)]
    pub schema: Option<String>,

    /// Table to compare
    #[arg(long)]
    pub table: String,

    /// Comma-separated non-key columns included in the comparison
    #[arg(long = "extraColumns", default_value = "")]
    pub extra_columns: String,

    /// Comma-separated primary key column names
    #[arg(long = "primaryKeys")]
    pub primary_keys: String,

    /// Backend driver: "duckdb", "postgres" or "mysql"
    #[arg(long, default_value = "duckdb")]
    pub driver: String,

    /// Last-modified column included in the comparison
    #[arg(long = "updateColumn", default_value = DEFAULT_UPDATE_COLUMN)]
    pub update_column: String,

    /// Number of diff worker threads (1 disables threading)
    #[arg(long, default_value_t = DEFAULT_MAX_THREADS, value_parser = validate_threads)]
    pub threads: usize,

    /// Segments per bisection level (must be >= 2)
    #[arg(long = "bisectionFactor", default_value_t = DEFAULT_BISECTION_FACTOR, value_parser = validate_bisection_factor)]
    pub bisection_factor: usize,

    /// Segment size below which rows are downloaded and compared directly
    #[arg(long = "bisectionThreshold", default_value_t = DEFAULT_BISECTION_THRESHOLD, value_parser = validate_bisection_threshold)]
    pub bisection_threshold: u64,

    /// Stop after emitting this many diff rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output the result list as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Split a comma-separated column list into ordered names
pub fn split_columns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .collect()
}

/// Validate that the worker count is greater than 0
fn validate_threads(s: &str) -> Result<usize, String> {
    let threads: usize = s
        .parse()
        .map_err(|_| format!("Invalid thread count: '{}'. Must be a positive integer.", s))?;

    if threads == 0 {
        return Err("Thread count must be greater than 0".to_string());
    }

    Ok(threads)
}

/// Validate that the bisection factor allows an actual split
fn validate_bisection_factor(s: &str) -> Result<usize, String> {
    let factor: usize = s
        .parse()
        .map_err(|_| format!("Invalid bisection factor: '{}'. Must be a positive integer.", s))?;

    if factor < 2 {
        return Err("Bisection factor must be at least 2".to_string());
    }

    Ok(factor)
}

/// Validate that the download threshold is greater than 0
fn validate_bisection_threshold(s: &str) -> Result<u64, String> {
    let threshold: u64 = s.parse().map_err(|_| {
        format!(
            "Invalid bisection threshold: '{}'. Must be a positive integer.",
            s
        )
    })?;

    if threshold == 0 {
        return Err("Bisection threshold must be greater than 0".to_string());
    }

    Ok(threshold)
}
