use anyhow::Context;
use bract_lib::browser::BrowserClient;
use bract_lib::config::{self, Config};
use bract_lib::logging::init_logging;
use bract_lib::mcp::BrowserMcpServer;
use bract_lib::websocket::run_server;
use clap::Parser;
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Expose the browser extension's automation actions as MCP tools over stdio
#[derive(Parser, Debug)]
#[command(name = "bract", version)]
struct Cli {
    /// Config file; overrides MCP_BROWSER_CONFIG and the default search path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            let mut config = config::load_config_from(path)?;
            config::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config
        }
        None => config::load_config()?,
    };
    config::validate_config(&config)?;
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load(&cli).context("Failed to load configuration")?;
    init_logging(&config.logging);

    tracing::info!(
        "Starting {} {} (extension link on {}:{})",
        config.server.name,
        config.server.version,
        config.websocket.host,
        config.websocket.port
    );

    let shutdown = CancellationToken::new();
    let client = Arc::new(BrowserClient::from_config(&config.websocket));

    let ws_config = config.websocket.clone();
    let ws_client = client.clone();
    let ws_shutdown = shutdown.clone();
    let ws_task = tokio::spawn(async move {
        let result = run_server(&ws_config, ws_client, ws_shutdown.clone()).await;
        if let Err(e) = &result {
            tracing::error!("WebSocket server error: {}", e);
            ws_shutdown.cancel();
        }
        result
    });

    let server = BrowserMcpServer::new(client, &config.server);
    let transport = tokio::io::join(tokio::io::stdin(), tokio::io::stdout());
    let service = server
        .serve(transport)
        .await
        .context("Failed to start MCP server")?;
    let mcp_shutdown = service.cancellation_token();

    tokio::select! {
        result = service.waiting() => {
            match result {
                Ok(reason) => tracing::info!("MCP session ended: {:?}", reason),
                Err(e) => tracing::error!("MCP session failed: {}", e),
            }
        }
        _ = shutdown_signal() => tracing::info!("Shutdown signal received"),
        _ = shutdown.cancelled() => {}
    }

    mcp_shutdown.cancel();
    shutdown.cancel();
    match ws_task.await {
        Ok(result) => result.context("WebSocket server failed")?,
        Err(e) => tracing::warn!("WebSocket task ended abnormally: {}", e),
    }

    tracing::info!("Bridge stopped");
    Ok(())
}
