use thiserror::Error;

use crate::protocol::DecodeError;
use crate::services::providers::GenerationError;

pub const EMPTY_QUERY_MESSAGE: &str = "Query가 비어있습니다.";
pub const ENCODING_MESSAGE: &str = "잘못된 입력이 감지되었습니다. 다시 질문해주세요.";
pub const MALFORMED_MESSAGE: &str = "잘못된 JSON 형식입니다.";
pub const TOO_LARGE_MESSAGE: &str = "요청 메시지가 너무 큽니다.";
pub const INTERNAL_MESSAGE: &str = "서버 내부 오류가 발생했습니다.";

/// Failure of a single connection's exchange. Never outlives the connection.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("query is empty")]
    EmptyQuery,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("connection I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Fixed text sent to the client in the `Error` field.
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::EmptyQuery => EMPTY_QUERY_MESSAGE,
            ChatError::Decode(DecodeError::Encoding(_)) => ENCODING_MESSAGE,
            ChatError::Decode(DecodeError::Malformed(_)) => MALFORMED_MESSAGE,
            ChatError::Decode(DecodeError::MessageTooLarge { .. }) => TOO_LARGE_MESSAGE,
            ChatError::Generation(_) | ChatError::Io(_) | ChatError::Internal(_) => {
                INTERNAL_MESSAGE
            }
        }
    }

    /// Metrics label for the connection outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            ChatError::EmptyQuery => "empty_query",
            ChatError::Decode(DecodeError::Encoding(_)) => "encoding_error",
            ChatError::Decode(DecodeError::Malformed(_)) => "malformed",
            ChatError::Decode(DecodeError::MessageTooLarge { .. }) => "too_large",
            ChatError::Generation(_) => "generation_failed",
            ChatError::Io(_) | ChatError::Internal(_) => "internal_error",
        }
    }

    /// Whether the failure is on our side rather than the client's.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ChatError::Generation(_) | ChatError::Io(_) | ChatError::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;

    #[test]
    fn test_user_messages_per_case() {
        assert_eq!(ChatError::EmptyQuery.user_message(), EMPTY_QUERY_MESSAGE);

        let malformed = decode(b"{", 2048).unwrap_err();
        assert_eq!(ChatError::from(malformed).user_message(), MALFORMED_MESSAGE);

        let encoding = decode(&[0xff], 2048).unwrap_err();
        assert_eq!(ChatError::from(encoding).user_message(), ENCODING_MESSAGE);

        let generation = ChatError::from(GenerationError::NetworkError("down".to_string()));
        assert_eq!(generation.user_message(), INTERNAL_MESSAGE);
        assert!(generation.is_internal());
    }

    #[test]
    fn test_client_errors_are_not_internal() {
        assert!(!ChatError::EmptyQuery.is_internal());
        let too_large = ChatError::from(DecodeError::MessageTooLarge { limit: 10 });
        assert!(!too_large.is_internal());
        assert_eq!(too_large.outcome(), "too_large");
    }
}
