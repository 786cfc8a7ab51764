use crate::cache::CacheKey;

/// Local input problems caught before a transaction begins.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long ({len} > {max} characters)")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid {field} colour '{value}', expected #RRGGBB")]
    InvalidColor { field: &'static str, value: String },

    #[error("Unknown {field} icon '{value}'")]
    InvalidIcon { field: &'static str, value: String },

    #[error("WIP limit must be a positive integer, got {0}")]
    InvalidWipLimit(i64),
}

/// Failures reported by the remote persistence service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Column {column_id} is at its WIP limit of {limit}")]
    WipLimitExceeded { column_id: String, limit: i64 },

    #[error("Column {column_id} still holds {cards} card(s)")]
    ColumnNotEmpty { column_id: String, cards: usize },

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<ValidationError> for RemoteError {
    fn from(err: ValidationError) -> Self {
        RemoteError::Invalid(err.to_string())
    }
}

/// What a transaction hands back to its caller when it does not succeed.
/// By the time this is returned every affected cache key has been restored.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{operation} was rejected: {source}")]
    Rejected {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to load {key}: {source}")]
    Load {
        key: CacheKey,
        #[source]
        source: RemoteError,
    },
}

impl EngineError {
    /// The underlying remote error, if the failure came from the service.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            EngineError::Validation(_) => None,
            EngineError::Rejected { source, .. } | EngineError::Load { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}
