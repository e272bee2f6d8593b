//! Core error types.

use thiserror::Error;

use sieve_proto::ExecutionTrace;

/// Boxed error from a datastore or cache adapter.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by datastore and cache adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the request.
    #[error("backend rejected query: {0}")]
    Rejected(String),

    /// Stored data could not be decoded.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Any other adapter failure.
    #[error(transparent)]
    Other(#[from] BoxError),
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Untrusted input was rejected before any datastore access.
    #[error("validation error: {0}")]
    Validation(String),

    /// Datastore work exceeded the configured timeout.
    #[error("query on {entity} timed out after {timeout_ms}ms")]
    QueryTimeout {
        /// Entity being queried.
        entity: String,
        /// Configured timeout.
        timeout_ms: u64,
        /// Stages completed before the timeout fired.
        trace: ExecutionTrace,
    },

    /// Caller exceeded a request budget. Reserved; the engine never raises it.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// No descriptor is registered for the entity.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Datastore failure, with request context attached.
    #[error("datastore error on {entity} (actor {actor}, query {spec}): {source}")]
    Datastore {
        /// Entity being queried.
        entity: String,
        /// Actor issuing the request, or `anonymous`.
        actor: String,
        /// Sanitized query parameters.
        spec: String,
        /// Underlying adapter error.
        #[source]
        source: StoreError,
    },

    /// Encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// HTTP status class for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::UnknownEntity(_) => 404,
            Error::RateLimited(_) => 429,
            Error::QueryTimeout { .. } => 504,
            Error::Datastore { .. } | Error::Serialization(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::UnknownEntity(_) => "UNKNOWN_ENTITY",
            Error::RateLimited(_) => "RATE_LIMITED",
            Error::QueryTimeout { .. } => "QUERY_TIMEOUT",
            Error::Datastore { .. } => "DATASTORE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the error was raised before the datastore was touched.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl From<sieve_proto::Error> for Error {
    fn from(err: sieve_proto::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("bad limit").status_code(), 400);
        assert_eq!(Error::RateLimited("slow down".into()).status_code(), 429);
        let timeout = Error::QueryTimeout {
            entity: "Invoice".into(),
            timeout_ms: 50,
            trace: ExecutionTrace::new(),
        };
        assert_eq!(timeout.status_code(), 504);
        assert_eq!(timeout.code(), "QUERY_TIMEOUT");
    }

    #[test]
    fn test_datastore_error_keeps_source() {
        let err = Error::Datastore {
            entity: "Product".into(),
            actor: "u1".into(),
            spec: "{}".into(),
            source: StoreError::Unavailable("connection reset".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("Product"));
        assert!(msg.contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
