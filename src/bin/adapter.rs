use std::path::PathBuf;

use clap::Parser;
use mygrpcadapter::{AdapterConfig, AuthorizationServer};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "mygrpcadapter")]
#[command(about = "gRPC authorization adapter for the policy mesh", long_about = None)]
#[command(version)]
struct Args {
    /// Port to listen on ("0" or empty for any free port)
    #[arg(short, long, env = "ADAPTER_PORT")]
    port: Option<String>,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/adapter.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logging is configured from the loaded values, so load errors are
    // reported once the subscriber exists.
    let (mut config, config_error) = match AdapterConfig::load(&args.config) {
        Ok(config) => (config, None),
        Err(e) => (AdapterConfig::default(), Some(e)),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(e) = config_error {
        error!("Failed to load configuration: {e}");
        info!("Using default configuration");
    }

    config.validate()?;

    let server = AuthorizationServer::bind(&config.server.port).await?;

    let (done_tx, done_rx) = oneshot::channel();
    let serving = server.clone();
    let server_handle = tokio::spawn(async move { serving.run(done_tx).await });

    shutdown_signal().await;

    info!("Initiating graceful shutdown (allowing in-flight requests to complete)");
    if let Err(e) = server.stop().await {
        error!("Shutdown failed: {e}");
    }

    match done_rx.await {
        Ok(Ok(())) => info!("Server shutdown complete"),
        Ok(Err(e)) => error!("Server error: {e}"),
        Err(_) => warn!("Serve loop exited without reporting"),
    }

    if let Err(e) = server_handle.await {
        error!("Server task panicked: {e}");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
