// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::Parser;
use std::backtrace::Backtrace;
use std::path::PathBuf;
use std::sync::Arc;
use todo_config::{load_config, validate_config};
use todo_gateway::{AppState, build_app, build_validator};
use todo_service::InMemoryStore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "todo-server", version, about = "Task API server")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address; overrides the configuration.
    #[arg(long)]
    bind: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("load configuration")?;
    if let Some(bind) = args.bind {
        config.http_bind = bind;
    }

    init_tracing(&config.log_level, args.debug, args.log_json);
    install_panic_hook();

    for warning in validate_config(&config).context("validate configuration")? {
        warn!(%warning, "configuration warning");
    }
    let addr = config.bind_addr().context("resolve bind address")?;
    let validator = build_validator(&config)?;

    let state = Arc::new(AppState::in_process(
        &config,
        validator,
        Arc::new(InMemoryStore::new()),
    ));
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(bind = %addr, "todo-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")
}

fn init_tracing(level: &str, debug: bool, json: bool) {
    let filter = if debug {
        EnvFilter::new("todo=debug")
    } else {
        EnvFilter::new(format!("todo={level}"))
    };

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Log panics through `tracing` before the guards turn them into responses.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        let backtrace = Backtrace::force_capture();
        error!(
            panic = %info,
            location = %location,
            backtrace = %backtrace,
            "panic"
        );
    }));
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => error!(error = %err, "failed to listen for shutdown signal"),
    }
}
