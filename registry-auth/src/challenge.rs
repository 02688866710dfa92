//! `WWW-Authenticate` challenge parsing.
//!
//! A 401 from a registry carries a challenge header in the form
//! `Bearer realm="https://auth.example.io/token",service="example.io"`.
//! Parsing is pure; acting on the result is the executor's job.

use http::Uri;
use thiserror::Error;

/// Failure to interpret a `WWW-Authenticate` header.
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// The header did not follow the `<Scheme> key="value",...` grammar.
    #[error("malformed authentication challenge: {0}")]
    Malformed(String),

    /// The scheme is neither `Basic` nor `Bearer`.
    #[error("unsupported authentication scheme: {0}")]
    UnsupportedScheme(String),
}

/// A parsed authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// RFC 7617 Basic authentication; credentials go directly on the retry.
    Basic,

    /// Token authentication against an authorization realm.
    Bearer(BearerChallenge),
}

/// Parameters of a `Bearer` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    /// Authorization endpoint to exchange credentials at.
    pub realm: Uri,

    /// Name of the service hosting the protected resource.
    pub service: Option<String>,

    /// Scope the registry suggested for the token.
    pub scope: Option<String>,
}

/// Parse a `WWW-Authenticate` header value into a [`Challenge`].
///
/// Scheme matching is case-insensitive. `Basic` needs no parameters;
/// `Bearer` requires a `realm` and may carry `service` and `scope`. Values
/// may be quoted, and commas inside quotes do not split parameters.
pub fn parse_challenge(header: &str) -> Result<Challenge, ChallengeError> {
    let header = header.trim();
    let (scheme, params) = match header.split_once(char::is_whitespace) {
        Some((scheme, params)) => (scheme, params.trim_start()),
        None => (header, ""),
    };

    if scheme.eq_ignore_ascii_case("basic") {
        return Ok(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ChallengeError::UnsupportedScheme(scheme.to_owned()));
    }

    let mut realm = None;
    let mut service = None;
    let mut scope = None;

    for param in split_params(params)? {
        let Some((key, value)) = param.split_once('=') else {
            return Err(ChallengeError::Malformed(format!(
                "parameter without '=': {param}"
            )));
        };
        let value = unquote(value.trim())?;
        match key.trim().to_ascii_lowercase().as_str() {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }

    let realm = realm.ok_or_else(|| ChallengeError::Malformed("missing realm".to_owned()))?;
    let realm = realm
        .parse::<Uri>()
        .map_err(|error| ChallengeError::Malformed(format!("invalid realm: {error}")))?;

    Ok(Challenge::Bearer(BearerChallenge {
        realm,
        service,
        scope,
    }))
}

/// Split a parameter list on commas, honoring quoted sections.
fn split_params(params: &str) -> Result<Vec<&str>, ChallengeError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;

    for (idx, c) in params.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&params[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if quoted {
        return Err(ChallengeError::Malformed("unbalanced quote".to_owned()));
    }

    parts.push(&params[start..]);
    Ok(parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect())
}

/// Strip surrounding quotes from a parameter value.
fn unquote(value: &str) -> Result<String, ChallengeError> {
    if let Some(stripped) = value.strip_prefix('"') {
        match stripped.strip_suffix('"') {
            Some(inner) => Ok(inner.to_owned()),
            None => Err(ChallengeError::Malformed(format!(
                "unbalanced quote in {value}"
            ))),
        }
    } else if value.contains('"') {
        Err(ChallengeError::Malformed(format!("stray quote in {value}")))
    } else {
        Ok(value.to_owned())
    }
}
