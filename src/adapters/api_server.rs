use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::{AuthConfig, ServerConfig};
use crate::coordination::GracefulShutdown;
use crate::error::{LogHookError, Result};
use crate::services::Pipeline;

/// Serve the HTTP API until shutdown is requested
///
/// In-flight requests finish before this returns; the caller drains the
/// persistence worker afterwards.
pub async fn start_api_server(
    pipeline: Pipeline,
    server: &ServerConfig,
    auth: AuthConfig,
    shutdown: Arc<GracefulShutdown>,
) -> Result<()> {
    let app = create_router(AppState::new(pipeline, auth));

    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| LogHookError::Internal(format!("invalid bind address: {}", e)))?;

    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.requested().await })
        .await?;

    info!("API server stopped accepting requests");
    Ok(())
}
