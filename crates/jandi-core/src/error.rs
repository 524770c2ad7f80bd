//! Error types for the core library.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration-related error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Neither a refresh token nor an email/password pair was configured.
    #[error("no usable credential: {0}")]
    Credential(String),

    /// The interactive sign-in could not produce a refresh token.
    #[error("sign-in failed: {0}")]
    LoginFailed(String),

    /// Token exchange or identity lookup was rejected by the server.
    #[error("authentication failed: {status} - {body}")]
    Auth {
        /// Upstream HTTP status code.
        status: u16,
        /// Upstream response body.
        body: String,
    },

    /// The account is not a member of any team.
    #[error("no team membership found for account {account_id}")]
    NoMembership {
        /// Account the identity lookup resolved to.
        account_id: String,
    },

    /// An authenticated API call failed after the permitted retry.
    #[error("request failed: {status} {reason}")]
    Request {
        /// Upstream HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status.
        reason: String,
    },

    /// A transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;
