use crate::context::AppContext;
use anyhow::{Context, Result};
use axum::Router;
use tokio::signal;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod routes;

pub use error::AppError;

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    routes::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Start the HTTP server and run until Ctrl+C or SIGTERM.
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let host = ctx.config.server.host.clone();
    let port = ctx.config.server.port;
    let app = create_router(ctx);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    tracing::info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
