//! Client side of the bot's one-exchange-per-connection protocol.

use chatbot_service::protocol::ChatRequest;
use service_core::error::AppError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::BotClientConfig;

#[derive(Debug, Clone)]
pub struct BotClient {
    address: String,
    timeout: Duration,
    max_response_bytes: u64,
}

impl BotClient {
    pub fn new(config: &BotClientConfig) -> Self {
        Self {
            address: config.address.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_response_bytes: config.max_response_bytes,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send `query` over a fresh connection and return the bot's JSON reply
    /// untouched.
    pub async fn ask(&self, query: String) -> Result<serde_json::Value, AppError> {
        tokio::time::timeout(self.timeout, self.exchange(query))
            .await
            .map_err(|_| AppError::BadGateway("chatbot did not answer in time".to_string()))?
    }

    async fn exchange(&self, query: String) -> Result<serde_json::Value, AppError> {
        let payload = serde_json::to_vec(&ChatRequest::new(query))
            .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?;

        let mut stream = TcpStream::connect(&self.address).await.map_err(|e| {
            tracing::error!(address = %self.address, error = %e, "Failed to connect to chatbot");
            AppError::BadGateway(format!("chatbot unreachable: {}", e))
        })?;

        stream
            .write_all(&payload)
            .await
            .map_err(|e| AppError::BadGateway(format!("failed to send query: {}", e)))?;

        // The bot closes the connection after its single reply.
        let mut reply = Vec::new();
        (&mut stream)
            .take(self.max_response_bytes)
            .read_to_end(&mut reply)
            .await
            .map_err(|e| AppError::BadGateway(format!("failed to read reply: {}", e)))?;

        serde_json::from_slice(&reply).map_err(|e| {
            tracing::error!(error = %e, reply_len = reply.len(), "Chatbot sent an invalid reply");
            AppError::BadGateway("chatbot sent an invalid reply".to_string())
        })
    }
}
