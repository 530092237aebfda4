use thiserror::Error;

/// Errors raised while authorizing an outgoing request.
///
/// Cloneable so that a single refresh outcome can be handed to every
/// request waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Access token could not be decoded")]
    MalformedCredential,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Session was closed while waiting for a token refresh")]
    SessionClosed,

    #[error("Token storage error: {0}")]
    Storage(String),
}
