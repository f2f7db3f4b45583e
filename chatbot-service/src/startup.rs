//! Application startup and lifecycle management.
//!
//! This module wires the bot's TCP dispatcher together with a minimal HTTP
//! server for health and metrics. The text generator is injected so tests
//! can substitute their own.

use crate::config::{ChatbotConfig, GeneratorKind};
use crate::normalizer::Normalizer;
use crate::server::{bind_listener, ConnectionDispatcher, ConnectionHandler, WorkerPool};
use crate::services::metrics;
use crate::services::providers::inference::{InferenceConfig, InferenceTextGenerator};
use crate::services::providers::mock::MockTextGenerator;
use crate::services::providers::{GenerationParams, TextGenerator};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use service_core::error::AppError;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    generator: Arc<dyn TextGenerator>,
    pool: WorkerPool,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.generator.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "chatbot-service",
                "version": env!("CARGO_PKG_VERSION"),
                "generator": state.generator.name(),
                "workers": {
                    "capacity": state.pool.capacity(),
                    "busy": state.pool.busy(),
                    "queued": state.pool.queued(),
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "chatbot-service",
                "generator": state.generator.name(),
                "error": e.to_string()
            })),
        ),
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn metrics_handler() -> impl IntoResponse {
    metrics::get_metrics()
}

/// Build the generator selected in configuration.
pub fn build_generator(config: &ChatbotConfig) -> Result<Arc<dyn TextGenerator>, AppError> {
    let generator: Arc<dyn TextGenerator> = match config.generator.provider {
        GeneratorKind::Inference => {
            let settings = &config.generator;
            let inference = InferenceTextGenerator::new(InferenceConfig {
                endpoint: settings.endpoint.clone(),
                timeout: Duration::from_secs(settings.timeout_secs),
                params: GenerationParams {
                    max_new_tokens: settings.max_new_tokens,
                    temperature: settings.temperature,
                    top_k: settings.top_k,
                    top_p: settings.top_p,
                    max_input_tokens: settings.max_input_tokens,
                    do_sample: settings.do_sample,
                },
            })
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

            tracing::info!(
                endpoint = %settings.endpoint,
                "Initialized inference text generator"
            );
            Arc::new(inference)
        }
        GeneratorKind::Mock => {
            tracing::warn!("Using mock text generator");
            Arc::new(MockTextGenerator::new())
        }
    };

    Ok(generator)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    bot_port: u16,
    http_listener: TcpListener,
    dispatcher: ConnectionDispatcher,
    generator: Arc<dyn TextGenerator>,
}

impl Application {
    /// Build the application with the given configuration and generator.
    pub async fn build(
        config: ChatbotConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        metrics::init_metrics().map_err(|e| {
            tracing::error!("Failed to initialize metrics: {}", e);
            AppError::InternalError(anyhow::anyhow!("Failed to initialize metrics: {}", e))
        })?;

        // Bind HTTP listener (port 0 = random port for testing)
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        // Bind bot listener (port 0 = random port for testing)
        let bot_addr = SocketAddr::from(([0, 0, 0, 0], config.bot.port));
        let bot_listener = bind_listener(bot_addr, config.bot.listen_backlog).map_err(|e| {
            tracing::error!("Failed to bind bot listener to {}: {}", bot_addr, e);
            AppError::from(e)
        })?;

        let handler = ConnectionHandler::new(
            Arc::clone(&generator),
            Normalizer::new(&config.normalizer),
            config.bot.max_message_bytes,
        );
        let pool = WorkerPool::new(config.bot.worker_pool_size);
        let dispatcher = ConnectionDispatcher::new(bot_listener, pool, handler);
        let bot_port = dispatcher.local_addr()?.port();

        tracing::info!(
            generator = generator.name(),
            workers = config.bot.worker_pool_size,
            backlog = config.bot.listen_backlog,
            "Chatbot service: HTTP on port {}, bot on port {}",
            http_port,
            bot_port
        );

        Ok(Self {
            http_port,
            bot_port,
            http_listener,
            dispatcher,
            generator,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get the bot TCP port the server is listening on.
    pub fn bot_port(&self) -> u16 {
        self.bot_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_with_graceful_shutdown(std::future::pending()).await
    }

    /// Run the HTTP health server and the bot dispatcher until `signal`
    /// resolves, then stop both from accepting new connections.
    pub async fn run_with_graceful_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let health_state = HealthState {
            generator: self.generator,
            pool: self.dispatcher.pool().clone(),
        };

        let http_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .with_state(health_state);

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            signal.await;
            let _ = stop_tx.send(true);
        });

        let http = axum::serve(self.http_listener, http_router)
            .with_graceful_shutdown(stopped(stop_rx.clone()))
            .into_future();
        let bot = self.dispatcher.run_until(stopped(stop_rx));

        let (http_result, ()) = tokio::join!(http, bot);
        if let Err(e) = http_result {
            tracing::error!("HTTP server error: {}", e);
            return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
        }

        tracing::info!("Chatbot service stopped");
        Ok(())
    }
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}
