//! # HTTP Server
//!
//! Binds the chain routes behind a CORS layer and serves them until
//! Ctrl-C.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::routes::{chain_routes, AppState};
use crate::config::HttpConfig;
use crate::coordinator::MutationCoordinator;
use crate::observability::{log_event, log_event_with_fields, Event};

pub struct HttpServer {
    config: HttpConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpConfig, coordinator: Arc<MutationCoordinator>) -> Self {
        let router = Self::build_router(&config, AppState::new(coordinator));
        Self { config, router }
    }

    fn build_router(config: &HttpConfig, state: AppState) -> Router {
        // No configured origins: allow any (local development).
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        chain_routes(state).layer(cors)
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// The router, for in-process testing.
    pub fn router(self) -> Router {
        self.router
    }

    /// Serves until Ctrl-C.
    pub async fn start(self) -> io::Result<()> {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid socket address {}: {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?.to_string();
        log_event_with_fields(Event::Serving, &[("addr", bound.as_str())]);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;

        log_event(Event::ShutdownComplete);
        Ok(())
    }
}
