use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
}

impl Error {
    /// True when the store itself failed, as opposed to a refused operation.
    #[must_use]
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Serialization(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
