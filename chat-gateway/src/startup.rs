//! Application startup and lifecycle management for the gateway.

use crate::config::GatewayConfig;
use crate::handlers;
use crate::services::BotClient;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the gateway router around `client`.
pub fn router(client: BotClient) -> Router {
    Router::new()
        .route("/query", post(handlers::query))
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(client)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    client: BotClient,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: GatewayConfig) -> Result<Self, AppError> {
        let client = BotClient::new(&config.bot);

        // Bind HTTP listener (port 0 = random port for testing)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            upstream = %config.bot.address,
            "Chat gateway: HTTP on port {}",
            port
        );

        Ok(Self {
            port,
            listener,
            client,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_with_graceful_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves, letting in-flight requests finish.
    pub async fn run_with_graceful_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, router(self.client))
            .with_graceful_shutdown(signal)
            .await?;

        tracing::info!("Chat gateway stopped");
        Ok(())
    }
}
