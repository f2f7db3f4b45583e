//! Text-generation inference server provider.
//!
//! Talks to an HTTP inference server exposing `POST /generate` with the
//! `{"inputs": ..., "parameters": {...}}` request body. Both the single
//! object and the one-element array response forms are accepted.

use super::{GenerationError, GenerationParams, TextGenerator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inference provider configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub params: GenerationParams,
}

/// Inference server text generator.
pub struct InferenceTextGenerator {
    config: InferenceConfig,
    client: Client,
}

impl InferenceTextGenerator {
    pub fn new(config: InferenceConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                GenerationError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Build the API URL for the given path.
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn build_request<'a>(&self, query: &'a str) -> GenerateRequest<'a> {
        let params = &self.config.params;
        GenerateRequest {
            inputs: query,
            parameters: GenerateParameters {
                max_new_tokens: params.max_new_tokens,
                temperature: params.temperature,
                top_k: params.top_k,
                top_p: params.top_p,
                truncate: params.max_input_tokens,
                do_sample: params.do_sample,
                return_full_text: true,
            },
        }
    }
}

#[async_trait]
impl TextGenerator for InferenceTextGenerator {
    async fn generate(&self, query: &str) -> Result<String, GenerationError> {
        let request = self.build_request(query);
        let url = self.api_url("generate");

        tracing::debug!(
            endpoint = %self.config.endpoint,
            query_len = query.len(),
            "Sending request to inference server"
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(GenerationError::RateLimited);
            }

            return Err(GenerationError::ApiError(format!(
                "Inference server error {}: {}",
                status, error_text
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            GenerationError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        body.into_text().ok_or_else(|| {
            GenerationError::InvalidResponse("Response contained no generated text".to_string())
        })
    }

    async fn health_check(&self) -> Result<(), GenerationError> {
        let response = self
            .client
            .get(self.api_url("health"))
            .send()
            .await
            .map_err(|e| GenerationError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(GenerationError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }

    fn name(&self) -> &'static str {
        "inference"
    }
}

// Inference server API types

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Debug, Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    temperature: f32,
    top_k: u32,
    top_p: f32,
    truncate: u32,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerateResponse {
    Single(GeneratedText),
    Batch(Vec<GeneratedText>),
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        match self {
            GenerateResponse::Single(item) => Some(item.generated_text),
            GenerateResponse::Batch(items) => {
                items.into_iter().next().map(|item| item.generated_text)
            }
        }
    }
}
