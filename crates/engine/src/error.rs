use async_graphql::ErrorExtensions;
use store::{ErrorKind as StoreKind, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid filter: {0}")]
    BadFilter(String),

    #[error("Type conflict at '{path}': observed kinds {kinds}")]
    TypeConflict { path: String, kinds: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// Convenience type alias
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Stable, language-neutral kind name for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "configuration",
            EngineError::Validation(_) => "validation",
            EngineError::BadFilter(_) => "bad-filter",
            EngineError::TypeConflict { .. } => "type-conflict",
            EngineError::Store(err) => match err.kind() {
                StoreKind::NotFound => "not-found",
                StoreKind::PreconditionFailed => "precondition-failed",
                StoreKind::Conflict => "conflict",
                StoreKind::RateLimited => "rate-limited",
                StoreKind::ServiceUnavailable => "service-unavailable",
                StoreKind::Timeout => "timeout",
                // Driver failures that are not retryable surface as a
                // wrapped query failure.
                StoreKind::BadRequest
                | StoreKind::Unauthorized
                | StoreKind::QueryFailed
                | StoreKind::ServerError => "query-failed",
            },
        }
    }

    /// Convert into `async_graphql::Error` with a structured error code.
    /// Wrapped store internals are logged server-side, not leaked.
    pub fn extend(self) -> async_graphql::Error {
        let code = self.kind().replace('-', "_").to_uppercase();
        let message = match &self {
            EngineError::Store(err) if !matches!(err.kind(), StoreKind::NotFound | StoreKind::PreconditionFailed | StoreKind::Conflict) => {
                tracing::error!(error = %err, "Store error during resolution");
                format!("A data-source error occurred ({})", self.kind())
            }
            other => other.to_string(),
        };
        async_graphql::Error::new(message).extend_with(|_err, e| e.set("code", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(EngineError::Configuration("x".into()).kind(), "configuration");
        assert_eq!(EngineError::Validation("x".into()).kind(), "validation");
        assert_eq!(EngineError::BadFilter("x".into()).kind(), "bad-filter");
        assert_eq!(
            EngineError::TypeConflict { path: "a.b".into(), kinds: "string, number".into() }.kind(),
            "type-conflict"
        );
    }

    #[test]
    fn test_store_kinds_map_through() {
        assert_eq!(EngineError::Store(StoreError::NotFound("x".into())).kind(), "not-found");
        assert_eq!(EngineError::Store(StoreError::PreconditionFailed).kind(), "precondition-failed");
        assert_eq!(EngineError::Store(StoreError::Conflict("x".into())).kind(), "conflict");
        assert_eq!(
            EngineError::Store(StoreError::RateLimited { retry_after: None }).kind(),
            "rate-limited"
        );
        assert_eq!(
            EngineError::Store(StoreError::QueryFailed("boom".into())).kind(),
            "query-failed"
        );
        assert_eq!(
            EngineError::Store(StoreError::BadRequest("boom".into())).kind(),
            "query-failed"
        );
    }

    #[test]
    fn test_extend_sets_code_extension() {
        let err = EngineError::BadFilter("name; DROP".into()).extend();
        let rendered = format!("{:?}", err);
        assert!(rendered.contains("BAD_FILTER"), "missing code extension: {rendered}");
    }
}
