//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

/// eventsync - push-notified view refreshes
#[derive(Parser)]
#[command(
    name = "es",
    about = "Watch views and call API endpoints, kept in sync by pushed event ids",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream a view's state as JSON lines until interrupted
    Watch {
        /// View endpoint ID
        view_endpoint_id: String,

        /// Key passed to the view
        #[arg(short, long)]
        key: Option<String>,

        /// Auth key passed to the view
        #[arg(short, long)]
        auth_key: Option<String>,
    },

    /// Call an API endpoint and print the outcome
    Call {
        /// API endpoint ID
        endpoint_id: String,

        /// Parameter as key=value; values are parsed as JSON, falling back to a string
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
}

/// Parse a `key=value` parameter
pub fn parse_param(s: &str) -> Result<(String, Value), String> {
    debug!(%s, "parse_param: called");
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid parameter '{}': expected KEY=VALUE", s))?;

    if key.is_empty() {
        return Err(format!("invalid parameter '{}': empty key", s));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Collect parsed parameters into a JSON object; later keys win
pub fn params_to_map(params: Vec<(String, Value)>) -> Map<String, Value> {
    params.into_iter().collect()
}
