//! Error types for gpusim

use thiserror::Error;

/// Main error type for gpusim
#[derive(Error, Debug)]
pub enum SimError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Task failed validation
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Policy made a decision the engine cannot honor
    #[error("Policy error: {0}")]
    Policy(String),

    /// Run not found in the experiment store
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for gpusim operations
pub type SimResult<T> = Result<T, SimError>;

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SimError {
    fn from(err: toml::de::Error) -> Self {
        SimError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::Config("at least one GPU is required".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: at least one GPU is required"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SimError = io_err.into();
        assert!(matches!(err, SimError::Io(_)));
    }

    #[test]
    fn test_error_from_toml() {
        let err: SimError = toml::from_str::<toml::Value>("not = [valid")
            .unwrap_err()
            .into();
        assert!(matches!(err, SimError::Config(_)));
    }
}
