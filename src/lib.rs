pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod notifications;
pub mod pipeline;
pub mod workflow;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Initialization failed: {0}")]
    Core(#[from] core_state::CoreError),
    #[error("Cannot start API server: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the service until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env()?;
    let listen_addr = config.listen_addr;
    tracing::info!(
        oracle_url = %config.oracle_url,
        mail_relay = config.mail_relay_url.is_some(),
        "Configuration loaded"
    );

    let core = Arc::new(core_state::CoreState::new(config));
    core.initialize()?;

    let mut server = api::start_api_server(core, listen_addr).await?;
    tracing::info!(addr = %server.addr(), "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {e}");
    }
    server.shutdown();
    Ok(())
}
