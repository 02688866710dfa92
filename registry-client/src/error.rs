//! Errors surfaced by registry operations.

use http::StatusCode;
use thiserror::Error;

use registry_auth::AuthError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error from a registry operation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The authentication pipeline failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The registry answered with a non-success status (other than the 401s
    /// the authentication pipeline consumes); passed through untouched.
    #[error("registry responded with {status}: {body}")]
    Upstream {
        /// Status code returned by the registry.
        status: StatusCode,
        /// Response body text.
        body: String,
    },

    /// The manifest arrived with a media type outside the requested set.
    #[error("registry returned unrequested media type: {received}")]
    UnexpectedMediaType {
        /// The media type the registry sent.
        received: String,
    },

    /// The response carried no `Docker-Content-Digest` header.
    #[error("registry response carried no digest header")]
    MissingDigest,

    /// A pagination `Link` header did not parse or resolve.
    #[error("invalid pagination link: {0}")]
    InvalidPaginationLink(String),

    /// A URL could not be formed from the configured host and path.
    #[error("invalid registry URL: {0}")]
    InvalidUrl(String),

    /// The response body was not the JSON document the endpoint promises.
    #[error("error decoding registry response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response body could not be read.
    #[error("error reading response body: {0}")]
    Body(#[source] BoxError),
}
