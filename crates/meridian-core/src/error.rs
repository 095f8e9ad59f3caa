use std::time::Duration;

/// Error taxonomy for the orchestration core.
///
/// Every component returns this type; nothing constructs a transport-level
/// status directly. The gRPC boundary (in `meridian-runtime`) owns the one
/// mapping from this enum to status codes.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated")]
    Unauthenticated,

    /// Used both for genuinely missing resources and, deliberately, for
    /// cross-tenant/cross-user reads that must not disclose existence.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Optimistic-concurrency mismatch (review `If-Match`). Mapped to
    /// `ABORTED` at the gRPC boundary, the nearest status to HTTP 409.
    #[error("conflict: expected version {expected}, found {actual}")]
    Conflict { expected: i64, actual: i64 },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted {
        message: String,
        retry_after: Duration,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn not_found(kind: impl std::fmt::Display) -> Self {
        Self::NotFound(kind.to_string())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors a caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Sql(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
