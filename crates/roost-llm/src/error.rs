#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("invalid Ollama URL '{0}', expected http(s)://host[:port]")]
    InvalidUrl(String),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_display() {
        let err = LlmError::InvalidUrl("localhost".into());
        assert_eq!(
            err.to_string(),
            "invalid Ollama URL 'localhost', expected http(s)://host[:port]"
        );
    }

    #[test]
    fn stream_error_display() {
        let err = LlmError::Stream("connection reset".into());
        assert_eq!(err.to_string(), "stream error: connection reset");
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: LlmError = json_err.into();
        assert!(err.to_string().starts_with("JSON parse failed"));
    }
}
