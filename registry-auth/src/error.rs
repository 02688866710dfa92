//! Errors produced by the authentication pipeline.

use http::StatusCode;
use thiserror::Error;

use crate::challenge::ChallengeError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error from the authenticated request pipeline.
///
/// Variants are kept distinct so callers can tell bad credentials from an
/// unreachable registry from a scheme this client does not speak.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The `WWW-Authenticate` header did not parse.
    #[error("malformed authentication challenge: {0}")]
    MalformedChallenge(String),

    /// The registry demanded an authentication scheme this client does not
    /// speak.
    #[error("unsupported authentication scheme: {0}")]
    UnsupportedScheme(String),

    /// The challenge requires credentials and none (or unusable ones) were
    /// configured.
    #[error("registry requires credentials and none were provided")]
    CredentialRequired,

    /// The authorization realm rejected or botched the token exchange.
    #[error("token exchange failed with status {status}: {message}")]
    TokenExchangeFailed {
        /// Status returned by the realm.
        status: StatusCode,
        /// Response body, or a short description of what was missing.
        message: String,
    },

    /// A 401 arrived without an actionable challenge header.
    #[error("registry requires authentication but sent no usable challenge")]
    AuthenticationRequired,

    /// The authenticated retry was rejected again.
    #[error("authentication failed: registry rejected the authenticated retry")]
    AuthenticationFailed,

    /// The request or token exchange did not complete within the timeout.
    #[error("request timed out")]
    TransportTimeout,

    /// The transport failed to deliver the request.
    #[error(transparent)]
    Transport(#[from] hyperdriver::client::Error),

    /// The response body could not be read or decoded.
    #[error("error reading response body: {0}")]
    Body(#[source] BoxError),
}

impl From<ChallengeError> for AuthError {
    fn from(error: ChallengeError) -> Self {
        match error {
            ChallengeError::Malformed(message) => AuthError::MalformedChallenge(message),
            ChallengeError::UnsupportedScheme(scheme) => AuthError::UnsupportedScheme(scheme),
        }
    }
}
