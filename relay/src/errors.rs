use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Errors that can occur while relaying a request
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("failed to read upstream response body: {0}")]
    UpstreamBodyError(String),

    #[error("no target found for path: {0}")]
    NoTargetMatched(String),

    #[error("upstream request failed for {0}: {1}")]
    UpstreamRequestFailed(String, String),

    #[error("upstream timeout for {0}")]
    UpstreamTimeout(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
