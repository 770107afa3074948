//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::access::AccessResolver;
use super::middleware::{self, AllowedOrigins};
use super::routes::{health, history};
use crate::core::CoreApp;
use crate::domain::HistoryService;

pub struct ApiServer {
    app: CoreApp,
    access: Arc<dyn AccessResolver>,
    allowed_origins: AllowedOrigins,
}

impl ApiServer {
    /// Serve `app` with every caller resolved through `access`
    pub fn new(app: CoreApp, access: Arc<dyn AccessResolver>) -> Self {
        let allowed_origins = AllowedOrigins::new(
            &app.config.server.host,
            app.config.server.port,
            &app.config.server.cors_origins,
        );

        Self {
            app,
            access,
            allowed_origins,
        }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self {
            app,
            access,
            allowed_origins,
        } = self;

        let shutdown = app.shutdown.clone();

        let host = app.config.server.host.clone();
        let port = app.config.server.port;
        let addr = SocketAddr::new(
            host.parse()
                .with_context(|| format!("Invalid server host: {}", host))?,
            port,
        );

        let router = router(app.history.clone(), access, &allowed_origins);

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!(%addr, "History API listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}

/// Build the full HTTP router
pub fn router(
    history: Arc<HistoryService>,
    access: Arc<dyn AccessResolver>,
    allowed_origins: &AllowedOrigins,
) -> Router {
    let api = history::routes(history, access).route("/health", get(health::health));

    Router::new()
        .nest("/api", api)
        .fallback(middleware::handle_404)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors(allowed_origins))
}
