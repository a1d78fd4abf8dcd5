//! Store error types

/// Error type for key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned error: code={code}, message={message}")]
    Api { code: i64, message: String },

    #[error("unexpected response (status {status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("invalid store endpoint '{0}'")]
    InvalidEndpoint(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
