use thiserror::Error;

/// Failures talking to the translation or chat endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Network Error: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Decode Error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::Status(status.as_u16())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Failures reading or writing the settings store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("I/O Error: {0}")]
    Io(String),

    #[error("Format Error: {0}")]
    Format(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Format(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_shows_code() {
        assert_eq!(ClientError::Status(500).to_string(), "HTTP 500");
    }

    #[test]
    fn json_errors_map_to_decode_and_format() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(ClientError::from(bad), ClientError::Decode(_)));
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(StoreError::from(bad), StoreError::Format(_)));
    }
}
