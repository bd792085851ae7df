//! Startup helpers for the gateway server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::bridge::GatewayConfig;
use crate::server::{self, AppState};

/// Run the gateway until interrupted.
///
/// # Returns
/// `ExitCode::SUCCESS` after a graceful shutdown, `ExitCode::FAILURE` otherwise.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Monica bridge v{}", env!("CARGO_PKG_VERSION"));

    let state = match initialize() {
        Ok(state) => state,
        Err(e) => return failure("create state", &*e),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return failure("create runtime", &e),
    };

    if let Err(e) = runtime.block_on(server::serve(state, shutdown_signal())) {
        return failure("serve", &*e);
    }

    tracing::info!("Gateway stopped");
    ExitCode::SUCCESS
}

/// Load configuration from the environment and build the application state.
///
/// # Errors
/// Returns an error if the configuration is invalid or state creation fails.
pub fn initialize() -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    let config = GatewayConfig::from_env()?;

    tracing::info!(
        listen = %config.server.listen_addr(),
        backend = %config.backend.base_url,
        custom_bot = config.bot.custom_bot_mode,
        max_concurrent_uploads = config.upload.max_concurrent_uploads,
        auth = config.server.bearer_token.is_some(),
        "Gateway configured"
    );
    if config.backend.cookie.is_empty() {
        tracing::warn!("BRIDGE_COOKIE is not set; backend calls will be rejected");
    }

    Ok(AppState::new(config)?)
}

fn failure(stage: &str, err: &dyn std::error::Error) -> ExitCode {
    tracing::error!(stage, error = %err, "Gateway failed");
    ExitCode::FAILURE
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
