use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use stockx_backend::logging::{init_logging, LoggingConfig};
use stockx_backend::services::maintenance::MaintenanceScheduler;
use stockx_backend::{create_app, AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env())?;

    let config = AppConfig::from_env().context("invalid configuration")?;
    let addr = config.bind_addr;
    info!(
        "⚙️ Trainer: {} {:?} (timeout {:?}), analyzer: {} {:?} (timeout {:?})",
        config.train_command.program,
        config.train_command.args,
        config.train_command.timeout,
        config.sentiment_command.program,
        config.sentiment_command.args,
        config.sentiment_command.timeout,
    );

    let state = AppState::from_config(config);

    let mut scheduler = MaintenanceScheduler::new(state.history.clone()).await?;
    scheduler.start().await?;

    let app = create_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("🚀 StockX backend running at http://{}/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = scheduler.stop().await {
        warn!("Failed to stop maintenance scheduler cleanly: {}", e);
    }
    info!("👋 StockX backend stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
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

    info!("🛑 Shutdown signal received");
}
