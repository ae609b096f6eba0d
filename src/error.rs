use thiserror::Error;

/// Failures raised while handling a real-time event.
///
/// None of these end a connection: the gateway logs them and sends a private
/// `error` event back to the connection that caused them.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("join room {0} before sending messages to it")]
    NotJoined(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("malformed event: {0}")]
    Transport(#[from] serde_json::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Text sent to the client. Storage details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            CoreError::Persistence(_) => "storage is unavailable, try again".to_owned(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_details_are_hidden_from_clients() {
        let err = CoreError::Persistence(sqlx::Error::PoolTimedOut);
        assert!(err.to_string().contains("persistence failure"));
        assert!(!err.client_message().contains("pool"));
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err = CoreError::validation("message is empty");
        assert_eq!(err.client_message(), "message is empty");
    }
}
