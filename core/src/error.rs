use thiserror::Error;

/// Errors surfaced by the load generator library.
///
/// Per-request transport failures never show up here; they are folded into
/// the tracker's counters instead.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Rejected settings. Raised before any state is created.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid target URL: {0}")]
    InvalidTarget(#[from] url::ParseError),

    #[error("HTTP client initialization error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Logger initialization error: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GeneratorError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        GeneratorError::InvalidConfiguration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, GeneratorError>;
