//! Mock generator for local runs without a model server.

use super::{GenerationError, TextGenerator};
use async_trait::async_trait;

/// Follow-up appended after the echoed query, the way a causal model
/// continues its prompt.
const MOCK_FOLLOW_UP: &str = "그 경험에 대해 조금 더 자세히 말씀해 주세요.";

/// Mock text generator for testing.
#[derive(Debug, Default)]
pub struct MockTextGenerator;

impl MockTextGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, query: &str) -> Result<String, GenerationError> {
        // Simulate some inference latency
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;

        Ok(format!("{}: {} 답변: 네", query, MOCK_FOLLOW_UP))
    }

    async fn health_check(&self) -> Result<(), GenerationError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
