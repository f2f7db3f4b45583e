//! Per-connection request lifecycle.
//!
//! `Accepted -> Reading -> Decoded -> Generating -> Normalizing -> Responding
//! -> Closed`. Failures while reading, decoding or generating jump straight to
//! `Responding` with an error message. The stream is owned by the handler and
//! dropped (closed) on every path.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ChatError;
use crate::normalizer::Normalizer;
use crate::protocol::{self, ChatResponse};
use crate::services::metrics;
use crate::services::providers::TextGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Reading,
    Decoded,
    Generating,
    Normalizing,
    Responding,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::Reading => "reading",
            ConnectionState::Decoded => "decoded",
            ConnectionState::Generating => "generating",
            ConnectionState::Normalizing => "normalizing",
            ConnectionState::Responding => "responding",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

fn enter(state: ConnectionState) {
    tracing::debug!(state = %state, "Connection state changed");
}

/// Runs one request/response exchange. Shared by all workers.
pub struct ConnectionHandler {
    generator: Arc<dyn TextGenerator>,
    normalizer: Normalizer,
    max_message_bytes: usize,
}

impl ConnectionHandler {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        normalizer: Normalizer,
        max_message_bytes: usize,
    ) -> Self {
        Self {
            generator,
            normalizer,
            max_message_bytes,
        }
    }

    /// Handle `stream` end to end. Errors are answered and logged here; none
    /// escape to the caller.
    pub async fn handle<S>(&self, mut stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("connection", %request_id, %peer);

        async move {
            let started = Instant::now();
            enter(ConnectionState::Accepted);

            let (response, outcome) = match self.exchange(&mut stream).await {
                Ok(Some(response)) => (response, "answered"),
                Ok(None) => {
                    tracing::info!("Client closed the connection without sending a request");
                    enter(ConnectionState::Closed);
                    metrics::record_connection("disconnected", started.elapsed().as_secs_f64());
                    return;
                }
                Err(err) => {
                    if err.is_internal() {
                        tracing::error!(error = %err, "Request failed");
                    } else {
                        tracing::warn!(error = %err, "Rejected request");
                    }
                    (ChatResponse::error(err.user_message()), err.outcome())
                }
            };

            enter(ConnectionState::Responding);
            if let Err(e) = write_response(&mut stream, &response).await {
                tracing::warn!(error = %e, "Failed to write response");
            }

            enter(ConnectionState::Closed);
            let elapsed = started.elapsed();
            metrics::record_connection(outcome, elapsed.as_secs_f64());
            tracing::info!(
                outcome,
                elapsed_ms = elapsed.as_millis() as u64,
                "Connection closed"
            );
        }
        .instrument(span)
        .await
    }

    /// Read, decode, generate and normalize. `Ok(None)` means the client sent
    /// nothing.
    async fn exchange<S>(&self, stream: &mut S) -> Result<Option<ChatResponse>, ChatError>
    where
        S: AsyncRead + Unpin,
    {
        enter(ConnectionState::Reading);
        let mut buffer = vec![0u8; self.max_message_bytes];
        let read = stream.read(&mut buffer).await?;
        if read == 0 {
            return Ok(None);
        }

        let request = protocol::decode(&buffer[..read], self.max_message_bytes)?;
        enter(ConnectionState::Decoded);
        if request.is_blank() {
            return Err(ChatError::EmptyQuery);
        }

        enter(ConnectionState::Generating);
        let raw = self.generate(&request.query).await?;

        enter(ConnectionState::Normalizing);
        let answer = self.normalizer.normalize(&raw, &request.query);
        if let Some(reason) = answer.fallback() {
            tracing::info!(reason = reason.as_str(), "Generated text replaced by fallback");
            metrics::record_fallback(reason.as_str());
        }

        Ok(Some(ChatResponse::answer(
            request.query,
            answer.into_string(),
        )))
    }

    /// Call the generator in its own task so a panicking backend becomes an
    /// internal error for this connection only.
    async fn generate(&self, query: &str) -> Result<String, ChatError> {
        let generator = Arc::clone(&self.generator);
        let name = generator.name();
        let input = query.to_string();
        let started = Instant::now();

        let joined = tokio::spawn(async move { generator.generate(&input).await }).await;
        metrics::record_generation(started.elapsed().as_secs_f64());

        match joined {
            Ok(Ok(raw)) => {
                tracing::debug!(generator = name, raw_len = raw.len(), "Generation completed");
                Ok(raw)
            }
            Ok(Err(e)) => {
                metrics::record_generation_error(e.kind());
                Err(ChatError::Generation(e))
            }
            Err(e) => {
                metrics::record_generation_error("panic");
                Err(ChatError::Internal(format!("generator task failed: {}", e)))
            }
        }
    }
}

async fn write_response<S>(stream: &mut S, response: &ChatResponse) -> Result<(), ChatError>
where
    S: AsyncWrite + Unpin,
{
    let bytes = protocol::encode(response)
        .map_err(|e| ChatError::Internal(format!("failed to encode response: {}", e)))?;
    stream.write_all(&bytes).await?;
    stream.shutdown().await?;
    Ok(())
}
