//! Error types for Engram.
//!
//! Every failure the store or a frontend can report is one variant of
//! [`Error`], and every variant maps onto one of five [`ErrorKind`]
//! categories. Frontends translate kinds into their own shapes: the HTTP
//! server uses [`ErrorKind::http_status`], the tool server marks results
//! with `isError`, and the CLI prints `engram: <message>` and exits 1.

use thiserror::Error;

/// Result type alias for Engram operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by all frontends.
///
/// Kinds, not type names: callers match on the kind to decide status
/// codes and retry behavior, never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required field is missing, malformed, or out of bounds.
    InvalidInput,
    /// Referenced id does not exist or is soft-deleted.
    NotFound,
    /// A uniqueness or referential constraint rejected the write.
    Conflict,
    /// Database engine, I/O, or serialization failure.
    Internal,
    /// Request body exceeded the documented size limit.
    Capacity,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Capacity => 413,
            Self::Internal => 500,
        }
    }
}

/// Errors that can occur in Engram operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidInput(String),

    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    #[error("observation not found: {id}")]
    ObservationNotFound { id: i64 },

    #[error("session {id} already exists with different project or directory")]
    SessionConflict { id: String },

    #[error("topic key {topic_key:?} already in use for ({project}, {scope})")]
    TopicKeyConflict {
        project: String,
        scope: String,
        topic_key: String,
    },

    #[error("request body too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("sync error: {0}")]
    Sync(String),

    #[error("malformed chunk {chunk_id}: {message}")]
    MalformedChunk { chunk_id: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Convenience constructor for invalid-input errors.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Map this error to its [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::SessionNotFound { .. } | Self::ObservationNotFound { .. } => ErrorKind::NotFound,
            Self::SessionConflict { .. } | Self::TopicKeyConflict { .. } => ErrorKind::Conflict,
            Self::TooLarge { .. } => ErrorKind::Capacity,
            Self::Sync(_)
            | Self::MalformedChunk { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code, delegating to the kind.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.kind().http_status()
    }
}
