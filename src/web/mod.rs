//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::RecordStore;

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Endpoints reported by `/servers`; the response is sorted by endpoint.
    pub endpoints: Arc<[String]>,
    pub store: Arc<dyn RecordStore>,
}

/// Read-only web server for peakwatch.
pub struct Server {
    addr: SocketAddr,
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: &ServerConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            addr: SocketAddr::new(config.listen_addr, config.http_port),
            state: AppState {
                endpoints: config.endpoints.clone().into(),
                store,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/", get(handlers::handle_index))
            .route("/servers", get(handlers::handle_get_servers))
            .route("/icons/{filename}", get(handlers::handle_icon))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.routes();

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("Web server listening on {}", self.addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
