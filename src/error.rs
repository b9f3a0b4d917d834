use thiserror::Error;

/// Unified error type for the netwarden library.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rules file parse error: {0}")]
    RulesParse(#[from] toml::de::Error),

    #[error("Rules file write error: {0}")]
    RulesWrite(#[from] toml::ser::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed target: {0}")]
    Target(String),

    #[error("Proxy error: {0}")]
    Proxy(String),
}

pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WardenError = io_err.into();
        assert!(matches!(err, WardenError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn proxy_error_displays_message() {
        let err = WardenError::Proxy("connection refused".to_string());
        assert_eq!(err.to_string(), "Proxy error: connection refused");
    }

    #[test]
    fn rules_parse_error_converts() {
        let bad_toml = "[invalid";
        let toml_err = toml::from_str::<toml::Value>(bad_toml).unwrap_err();
        let err: WardenError = toml_err.into();
        assert!(matches!(err, WardenError::RulesParse(_)));
    }

    #[test]
    fn target_error_displays_message() {
        let err = WardenError::Target("http://%".to_string());
        assert_eq!(err.to_string(), "Malformed target: http://%");
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WardenError>();
    }
}
