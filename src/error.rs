#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Network error: {0}")]
    NetworkError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid SIP message: {0}")]
    InvalidMessage(String),
    #[error("Randomness source unavailable: {0}")]
    EntropyUnavailable(String),
    #[error("SIP parse error: {0}")]
    ParseError(String),
    #[error("Shutdown timeout")]
    ShutdownTimeout,
    #[error("Report output error: {0}")]
    OutputError(String),
}
