use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handlers;
use crate::PortalContext;

/// Build the portal router.
///
/// The redirect handler is mounted at the path of the configured redirect
/// URI so the provider lands directly on it.
pub fn router(ctx: Arc<PortalContext>) -> Router {
    let callback_path = ctx.config.identity.redirect_uri.path().to_string();

    Router::new()
        .route("/api/auth-config", get(handlers::auth_config))
        .route("/api/dynamics-config", get(handlers::dynamics_config))
        .route("/api/session", get(handlers::session))
        .route("/api/session/sign-in", post(handlers::sign_in))
        .route("/api/session/token", post(handlers::acquire_token))
        .route("/api/session/sign-out", post(handlers::sign_out))
        .route("/api/records/cases", get(handlers::list_cases))
        .route("/api/records/cases/:id", get(handlers::get_case))
        .route("/api/records/sales-orders", get(handlers::list_sales_orders))
        .route(&callback_path, get(handlers::redirect_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve the portal until Ctrl+C
pub async fn serve(ctx: Arc<PortalContext>) -> Result<()> {
    let addr = ctx.config.server.bind_addr;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, redirect_uri = %ctx.config.identity.redirect_uri, "Portal listening");

    let app = router(Arc::clone(&ctx));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Nobody is left to answer outstanding prompts
    ctx.surface.cancel_all();
    info!("Portal shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
