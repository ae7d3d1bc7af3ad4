use mindflow_core::errors::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The conversation would violate the tool-link invariant.
    #[error("conversation error: {0}")]
    Conversation(String),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// Text for the outbound `error` record. Gateway failures are shown as-is.
    pub fn user_message(&self) -> String {
        match self {
            Self::Gateway(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn gateway_errors_convert() {
        let err: EngineError = GatewayError::Timeout(Duration::from_secs(120)).into();
        assert!(matches!(err, EngineError::Gateway(GatewayError::Timeout(_))));
        assert_eq!(err.user_message(), "timeout after 120s");
    }

    #[test]
    fn conversation_error_display() {
        let err = EngineError::Conversation("tool result for unknown call c9".into());
        assert_eq!(err.to_string(), "conversation error: tool result for unknown call c9");
    }
}
