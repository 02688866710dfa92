//! Caller-supplied registry credentials.

use std::fmt;
use std::io::Write as _;

use base64::prelude::BASE64_STANDARD;
use base64::write::EncoderWriter;
use http::HeaderValue;

use crate::secret::Secret;

/// A credential for a registry.
///
/// The variant states the intended grant; the pipeline never infers it from
/// the credential's shape. An [`Credential::OAuth2`] client presented to a
/// `Basic` challenge is treated as missing credentials rather than silently
/// downgraded.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Username and password, used for Basic authentication and as HTTP
    /// Basic auth on bearer token exchanges.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: Secret,
    },

    /// A Base64 `username:password` pair as stored in a Docker config
    /// `auths[*].auth` field (RFC 7617), used verbatim.
    Encoded(Secret),

    /// OAuth2 client, exchanged with the `client_credentials` grant.
    OAuth2 {
        /// Client identifier.
        client_id: String,
        /// Client secret.
        client_secret: Secret,
    },
}

impl Credential {
    /// The Basic `Authorization` header for this credential, if it can
    /// produce one. OAuth2 clients authenticate at the token endpoint
    /// instead and yield `None`.
    pub(crate) fn basic_header(&self) -> Option<HeaderValue> {
        match self {
            Credential::Basic { username, password } => {
                Some(basic_auth(username, Some(password.revealed())))
            }
            Credential::Encoded(pair) => {
                match HeaderValue::try_from(format!("Basic {}", pair.revealed())) {
                    Ok(mut header) => {
                        header.set_sensitive(true);
                        Some(header)
                    }
                    Err(_) => {
                        tracing::warn!("pre-encoded credential is not a valid header value");
                        None
                    }
                }
            }
            Credential::OAuth2 { .. } => None,
        }
    }
}

/// Create a Basic authentication header value, with the password optional.
///
/// Basic authentication Base64 encodes the username and password, separated
/// by a colon (RFC 7617).
///
/// # Example
/// ```rust
/// use registry_auth::basic_auth;
///
/// let header = basic_auth("username", Some("password"));
/// assert_eq!(header.to_str().unwrap(), "Basic dXNlcm5hbWU6cGFzc3dvcmQ=");
/// ```
pub fn basic_auth<U, P>(username: U, password: Option<P>) -> HeaderValue
where
    U: fmt::Display,
    P: fmt::Display,
{
    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = EncoderWriter::new(&mut buf, &BASE64_STANDARD);
        let _ = write!(encoder, "{}:", username);
        if let Some(password) = password {
            let _ = write!(encoder, "{}", password);
        }
    }
    let mut header = HeaderValue::from_bytes(&buf).expect("base64 is always valid HeaderValue");
    header.set_sensitive(true);
    header
}
