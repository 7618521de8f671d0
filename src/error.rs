//! Crate-level error type.
//!
//! Every fallible operation in the client returns [`ClientError`]. The three
//! pipeline kinds (`TokenFetch`, `GatewayCall`, `StreamUnsupported`) are the
//! ones callers branch on; the rest describe the environment the pipeline
//! runs in.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the token manager, the function invoker, and the
/// session built on top of them.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The token-issuing endpoint failed or returned a body without `jwt`.
    #[error("token fetch failed: {0}")]
    TokenFetch(String),

    /// The gateway answered with a non-success status. `detail` is the raw
    /// response body.
    #[error("gateway call failed with HTTP {status}: {detail}")]
    GatewayCall { status: u16, detail: String },

    /// The response carries no body that can be read incrementally.
    #[error("streaming is not supported for this response: {0}")]
    StreamUnsupported(String),

    /// The resolve-then-call sequence exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure before a status line was received, or while
    /// reading the body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The key-value store could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A submission was attempted before authorization succeeded.
    #[error("not authorized: {0}")]
    NotAuthorized(String),
}

impl ClientError {
    /// HTTP status carried by a gateway failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::GatewayCall { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` for the kinds the refresh-retry policy may recover from.
    ///
    /// Configuration, storage and authorization-state errors will fail the
    /// same way with a fresh credential, so they are not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::TokenFetch(_)
                | ClientError::GatewayCall { .. }
                | ClientError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
