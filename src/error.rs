use anyhow::anyhow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    // Raised by the downstream transport while talking to the origin.
    // Candidate for the stale-if-error fallback during revalidation.
    #[error("HTTP transport error: {0}")]
    HttpTransportError(String),
    // Raised by the cache storage backend, including body resource reads on
    // entries whose bytes live outside the heap.
    #[error("Cache store error: {0}")]
    StoreError(String),
    #[error("HTTP protocol error: {0}")]
    ProtocolError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Application error: {0}")]
    ApplicationError(String),
}

/// True for errors that behave like an I/O failure on the wire or in the
/// store. The revalidation fallback paths treat both the same way.
pub fn is_io_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<CacheError>(),
        Some(CacheError::HttpTransportError(_)) | Some(CacheError::StoreError(_))
    )
}

pub fn gen<T: AsRef<str>>(msg: T) -> anyhow::Error {
    anyhow!(msg.as_ref().to_string())
}
