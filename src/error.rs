use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = EtlError> = std::result::Result<T, E>;

/// Terminal request errors.
///
/// Row-level data-quality problems are deliberately absent here: they are
/// collected into the transform outcome as [`crate::transform::RowError`]s
/// and the batch continues. Everything in this enum ends the request.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Malformed or missing caller input. Fatal to the request, never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Query-safety rejection: a column the schema model does not define.
    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    /// The table definition could not be applied.
    #[error("schema setup failed: {0}")]
    Schema(String),

    /// Connectivity or execution failure against the persisted store, or
    /// against the byte source/sink boundary. Retry policy belongs to the
    /// caller.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for EtlError {
    fn from(err: rusqlite::Error) -> Self {
        EtlError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        EtlError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for EtlError {
    fn from(err: reqwest::Error) -> Self {
        EtlError::Storage(err.to_string())
    }
}
