//! es - eventsync command line
//!
//! Watches views and calls API endpoints against one server.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use eventsync::channel::VersionChannel;
use eventsync::cli::{Cli, Command, params_to_map};
use eventsync::client::{ApiClient, InvokeOutcome, ViewRequest};
use eventsync::config::Config;
use eventsync::coordinator::Coordinator;
use eventsync::form::FormBody;
use eventsync::view::ViewSubscription;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eventsync")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("eventsync.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    info!(host = %config.server.host, "eventsync loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Watch {
            view_endpoint_id,
            key,
            auth_key,
        } => {
            debug!(%view_endpoint_id, "main: matched Watch command");
            let request = ViewRequest::new(view_endpoint_id).with_key(key).with_auth_key(auth_key);
            cmd_watch(&config, request).await
        }
        Command::Call { endpoint_id, params } => {
            debug!(%endpoint_id, "main: matched Call command");
            cmd_call(&config, &endpoint_id, FormBody::from_json(&params_to_map(params))).await
        }
    }
}

/// Stream view state changes as JSON lines until Ctrl-C
async fn cmd_watch(config: &Config, request: ViewRequest) -> Result<()> {
    debug!(view = %request.view_endpoint_id, "cmd_watch: called");
    let publishable_key = config.server.get_publishable_key()?;

    let coordinator = Coordinator::spawn(config.coordinator.clone());
    let client = ApiClient::from_config(&config.server, publishable_key.clone()).context("Failed to create client")?;

    let channel = VersionChannel::from_config(&config.server.host, &publishable_key, &config.channel, coordinator.clone())
        .context("Failed to create version channel")?;
    let channel_task = channel.spawn();

    let mut subscription = ViewSubscription::subscribe(&coordinator, client, request)
        .await
        .context("Failed to subscribe to view")?;

    loop {
        tokio::select! {
            changed = subscription.changed() => {
                let state = changed?;
                println!("{}", serde_json::to_string(&state)?);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    subscription.unsubscribe().await?;
    coordinator.shutdown().await?;

    if channel_task.is_finished() {
        match channel_task.await {
            Ok(Ok(summary)) => info!(?summary, "Version channel had closed"),
            Ok(Err(e)) => warn!(error = %e, "Version channel failed"),
            Err(e) => warn!(error = %e, "Version channel task failed"),
        }
    } else {
        channel_task.abort();
    }

    Ok(())
}

/// Invoke an API endpoint and print the outcome
///
/// One-shot: no views are watched, so the reported event id is only printed.
async fn cmd_call(config: &Config, endpoint_id: &str, body: FormBody) -> Result<()> {
    debug!(%endpoint_id, parts = body.parts().len(), "cmd_call: called");
    let publishable_key = config.server.get_publishable_key()?;

    let client = ApiClient::from_config(&config.server, publishable_key).context("Failed to create client")?;

    let outcome = client.invoke(endpoint_id, body).await.context("API call failed")?;

    match outcome {
        InvokeOutcome::Success { event_id, output } => {
            let event = event_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
            println!("{} {} (event {})", "✓".green(), endpoint_id.cyan(), event.yellow());
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        InvokeOutcome::Failure { error } => {
            println!("{} {}: {}", "✗".red(), endpoint_id.cyan(), error.red());
        }
    }

    Ok(())
}
