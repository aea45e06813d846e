#![forbid(unsafe_code)]

//! `livechat` — live-support chat server binary.
//!
//! Bootstraps configuration and storage, then runs the HTTP API, the IPC
//! server for `livechat-ctl`, and the background sweeps until shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use livechat::api::server::serve_http;
use livechat::config::GlobalConfig;
use livechat::ipc::server::spawn_ipc_server;
use livechat::orchestrator::sweeper;
use livechat::persistence::{db, retention};
use livechat::state::AppState;
use livechat::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "livechat", about = "Live-support chat server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured database path.
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("livechat server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(path) = args.db {
        config.db_path = path;
    }
    let config = Arc::new(config);
    info!("configuration loaded");

    let db = Arc::new(db::connect(&config.db_path).await?);
    info!(path = %config.db_path.display(), "database connected");

    let state = Arc::new(AppState::new(Arc::clone(&config), Arc::clone(&db)));
    let ct = CancellationToken::new();
    let mut handles = Vec::new();

    handles.push(retention::spawn_retention_task(
        Arc::clone(&state.db),
        config.retention_days,
        ct.clone(),
    ));

    if config.assignment.sweep_interval_seconds > 0 {
        handles.push(sweeper::spawn_assignment_sweep(
            state.lifecycle.clone(),
            Duration::from_secs(config.assignment.sweep_interval_seconds),
            ct.clone(),
        ));
    }

    if config.abandon.enabled {
        handles.push(sweeper::spawn_abandon_sweep(
            state.lifecycle.clone(),
            config.wait_timeout(),
            Duration::from_secs(config.abandon.sweep_interval_seconds),
            ct.clone(),
        ));
    }
    info!("background sweeps started");

    match spawn_ipc_server(Arc::clone(&state), ct.clone()) {
        Ok(handle) => handles.push(handle),
        Err(err) => error!(%err, "IPC server unavailable; continuing without livechat-ctl"),
    }

    let http_ct = ct.clone();
    let http_state = Arc::clone(&state);
    handles.push(tokio::spawn(async move {
        if let Err(err) = serve_http(http_state, http_ct).await {
            error!(%err, "HTTP API failed");
        }
    }));

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    for handle in handles {
        if let Err(err) = handle.await {
            error!(%err, "background task panicked");
        }
    }
    db.close().await;
    info!("livechat shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
