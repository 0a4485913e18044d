/// Domain-specific error types for the ranking engine.

#[derive(Debug, thiserror::Error)]
pub enum RecoError {
    #[error("product not found: {id}")]
    NotFound { id: i64 },

    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    #[error("dependency degraded: {0}")]
    DependencyDegraded(String),

    #[error("partial persistence failure: {0}")]
    PersistencePartialFailure(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for RecoError {
    fn from(e: sqlx::Error) -> Self {
        RecoError::Storage(e.to_string())
    }
}

impl RecoError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        RecoError::InvalidInput {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}
