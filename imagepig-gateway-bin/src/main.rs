//! HTTP server for the ImagePig gateway.

use std::net::SocketAddr;

use imagepig_gateway::{
    AppState, GatewayConfig, GatewayError, ProviderGateway, SessionKeys, image_api_router,
};
use tracing::info;

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    setup_log();

    let config = GatewayConfig::load();
    config.log_environment();

    // Refuse to serve image endpoints with an unusable credential.
    let api_key = config.validate()?;
    info!(key = %api_key.masked(), "API key status: CONFIGURED");

    let gateway = ProviderGateway::new(&config)?;
    let sessions = SessionKeys::from_optional_secret(config.session_secret.as_deref())?;
    let router = image_api_router(
        AppState::new(gateway, sessions),
        config.cors_origin.as_deref(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!("Server running on port {}", config.port);
    info!("Endpoints:");
    info!("  GET  /");
    info!("  GET  /api/images/health");
    for operation in imagepig_gateway::Operation::ALL {
        info!("  POST /api/images/{}", operation.route());
    }

    axum::serve(listener, router)
        .await
        .map_err(ServerError::Serve)
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("imagepig_gateway=info,imagepig_server=info,tower_http=info")
    });
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_err()
    {}
}
