use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Structured errors for all client operations.
///
/// Transport failures from the query path come in two shapes: terminal
/// statuses surface immediately as [`ClientError::Status`], transient statuses
/// are retried and, once the budget is exhausted, surface as
/// [`ClientError::RetriesExhausted`] carrying the last cause.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Caller-supplied input was rejected before any network activity.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The credential handshake was rejected during client construction.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Every attempt returned a transient status; holds the final cause.
    #[error("query failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<tonic::Status>,
    },

    /// Non-retryable status from the query transport.
    #[error("query failed: {0}")]
    Status(#[from] Box<tonic::Status>),

    /// Failed to establish the underlying gRPC channel.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The HTTP endpoint refused the connection.
    #[error("the Strake runtime is unavailable at {endpoint}. Is it running?")]
    ServiceUnavailable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The refresh call returned a non-201 response.
    #[error("failed to trigger dataset refresh. Status Code: {status}, Response: {body}")]
    RefreshFailed {
        status: reqwest::StatusCode,
        body: String,
    },

    /// HTTP-level failure other than a refused connection.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Decoding error on the result stream.
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl From<tonic::Status> for ClientError {
    fn from(status: tonic::Status) -> Self {
        Self::from(Box::new(status))
    }
}

impl ClientError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
