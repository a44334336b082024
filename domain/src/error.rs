use thiserror::Error;

/// Every failure the pipeline can produce.
///
/// Startup failures (`InvalidConfig`, `LoadFailure`) abort initialization.
/// Everything else is scoped to a single request and is converted to a
/// generic reply at the engine boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RagError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load document: {0}")]
    LoadFailure(String),

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("generation service unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("rate limited by upstream service: {0}")]
    RateLimited(String),

    #[error("query is empty")]
    EmptyQuery,

    #[error("index is not ready")]
    NotReady,
}

impl RagError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::LoadFailure(_) => "load_failure",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::GenerationUnavailable(_) => "generation_unavailable",
            Self::MalformedResponse(_) => "malformed_response",
            Self::RateLimited(_) => "rate_limited",
            Self::EmptyQuery => "empty_query",
            Self::NotReady => "not_ready",
        }
    }

    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::LoadFailure(_))
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyQuery)
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
