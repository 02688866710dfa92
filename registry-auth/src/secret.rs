//! Sensitive string handling for passwords and tokens.

use std::fmt;

use http::header::InvalidHeaderValue;
use http::HeaderValue;
use serde::Deserialize;
use zeroize::Zeroize;

/// A secret string: a password, a pre-encoded credential pair, or a bearer
/// token value.
///
/// The wrapper keeps the value out of `Debug` output and zeroes the buffer
/// on drop. Use [`Secret::revealed`] to read the value.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Read the underlying value.
    pub fn revealed(&self) -> &str {
        &self.0
    }

    /// Render `Bearer <value>` as a sensitive header value.
    pub fn bearer(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut header = HeaderValue::try_from(format!("Bearer {}", self.0))?;
        header.set_sensitive(true);
        Ok(header)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret(value.to_owned())
    }
}
