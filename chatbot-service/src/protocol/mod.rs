//! Wire format for the bot's TCP endpoint.
//!
//! One JSON object in, one JSON object out, one exchange per connection.
//! A request must arrive in a single read of at most `max_message_bytes`;
//! there is no length prefix.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("request is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("request is not a valid JSON message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("request exceeds the {limit} byte message limit")]
    MessageTooLarge { limit: usize },
}

/// Inbound message.
///
/// A missing or `null` `Query` decodes to an empty query; emptiness is
/// rejected by the dispatcher, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "Query", default, deserialize_with = "null_as_empty")]
    pub query: String,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.query.trim().is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Outbound message: exactly one of the two shapes per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Answer {
        #[serde(rename = "Query")]
        query: String,
        #[serde(rename = "Answer")]
        answer: String,
    },
    Error {
        #[serde(rename = "Error")]
        error: String,
    },
}

impl ChatResponse {
    pub fn answer(query: impl Into<String>, answer: impl Into<String>) -> Self {
        ChatResponse::Answer {
            query: query.into(),
            answer: answer.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ChatResponse::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ChatResponse::Error { .. })
    }
}

/// Decode the bytes of a single read.
///
/// `limit` is the read buffer size. A read that filled the buffer and still
/// fails to parse was most likely cut off, so it is reported as too large.
pub fn decode(bytes: &[u8], limit: usize) -> Result<ChatRequest, DecodeError> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        // A multi-byte character split at the buffer edge.
        Err(e) if bytes.len() >= limit && e.error_len().is_none() => {
            return Err(DecodeError::MessageTooLarge { limit });
        }
        Err(e) => return Err(DecodeError::Encoding(e)),
    };

    match serde_json::from_str(text) {
        Ok(request) => Ok(request),
        Err(_) if bytes.len() >= limit => Err(DecodeError::MessageTooLarge { limit }),
        Err(e) => Err(DecodeError::Malformed(e)),
    }
}

/// Encode a response as UTF-8 JSON; non-ASCII text is written verbatim.
pub fn encode(response: &ChatResponse) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(response)
}
