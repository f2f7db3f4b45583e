//! Text generation collaborators.
//!
//! The dispatcher only sees the [`TextGenerator`] trait, so the model backend
//! can be swapped (inference server, local mock, test doubles) without
//! touching connection handling.

pub mod inference;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for generation calls.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// Metrics label for the error type.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::NotConfigured(_) => "not_configured",
            GenerationError::ApiError(_) => "api_error",
            GenerationError::RateLimited => "rate_limited",
            GenerationError::NetworkError(_) => "network_error",
            GenerationError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    /// Inputs longer than this many tokens are truncated by the server.
    pub max_input_tokens: u32,
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: 0.8,
            top_k: 30,
            top_p: 0.95,
            max_input_tokens: 512,
            do_sample: true,
        }
    }
}

/// The model collaborator: one query in, one raw text out.
///
/// Implementations are shared by every worker and must tolerate concurrent
/// calls. Blocking backends should move their work off the async runtime.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate raw text for `query`. Called once per request, never retried.
    async fn generate(&self, query: &str) -> Result<String, GenerationError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), GenerationError>;

    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;
}
