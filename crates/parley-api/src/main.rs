//! Parley CLI and HTTP API entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, loads configuration, builds the session store and
//! model provider, then either serves the HTTP API or runs a one-shot
//! history command against the store.

mod cli;
mod http;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;
use secrecy::ExposeSecret;

use parley_core::chat::orchestrator::{TurnOrchestrator, TurnSettings};
use parley_infra::config::{load_config, require_api_key};
use parley_infra::llm::create_provider;
use parley_infra::store::create_session_store;
use parley_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
use parley_types::config::ServiceConfig;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need config or logging
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(TracingOptions {
        otel: cli.otel,
        json: cli.log_json,
        default_filter: cli.log_filter().to_string(),
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let config = load_config(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;

    let result = match cli.command {
        Commands::Serve { port, host } => serve(config, host, port).await,
        Commands::History { scope } => {
            let backend = create_session_store(&config.store)?;
            let result = cli::history::show_history(&backend.store, &scope, cli.json).await;
            if let Some(redis) = backend.redis {
                redis.shutdown().await;
            }
            result
        }
        Commands::Clear { scope, force } => {
            let backend = create_session_store(&config.store)?;
            let result =
                cli::history::clear_history(&backend.store, &scope, force, cli.json).await;
            if let Some(redis) = backend.redis {
                redis.shutdown().await;
            }
            result
        }
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}

/// Run the HTTP API until Ctrl+C or SIGTERM, then close the store.
async fn serve(mut config: ServiceConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let api_key = require_api_key(&config.server)?.expose_secret().to_string();

    let backend = create_session_store(&config.store)?;
    if let Some(redis) = &backend.redis {
        // Connection is lazy; an unreachable store only fails the requests that need it.
        if let Err(e) = redis.ping().await {
            tracing::warn!(error = %e, "Session store is not reachable yet");
        }
    }

    let provider = create_provider(&config.model);
    let orchestrator = TurnOrchestrator::new(
        Arc::new(backend.store),
        provider,
        TurnSettings::from_model_config(&config.model),
    );
    let state = AppState::new(orchestrator, &api_key, backend.redis);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, model = %config.model.model_id, "Parley API listening");
    println!(
        "  {} Parley API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state.clone());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
