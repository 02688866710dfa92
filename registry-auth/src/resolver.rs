//! Credential resolution: turning a challenge into something the retried
//! request can present.
//!
//! Basic challenges resolve locally. Bearer challenges call the challenge
//! realm: a plain GET with `service`/`scope` query parameters (with HTTP
//! Basic auth when a credential is configured, anonymously otherwise), or a
//! `client_credentials` form POST for OAuth2 clients.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Request, Uri};
use hyperdriver::Body;
use serde::{Deserialize, Serialize};

use crate::challenge::{BearerChallenge, Challenge};
use crate::credentials::Credential;
use crate::error::AuthError;
use crate::secret::Secret;
use crate::token::{Token, DEFAULT_TOKEN_TTL_SECONDS};
use crate::{response, send_raw, Transport};

/// What the executor attaches to the retried request.
#[derive(Debug)]
pub(crate) enum AuthArtifact {
    /// A ready `Authorization: Basic …` header value.
    Basic(HeaderValue),

    /// A bearer token, cached by the executor under the request's scope.
    Bearer(Token),
}

/// Token endpoint response. The token may arrive under either field name,
/// and `token` wins when both are present.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ExchangeQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ClientCredentialsForm<'a> {
    grant_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Resolve a challenge against the configured credential.
pub(crate) async fn resolve(
    challenge: Challenge,
    credential: Option<&Credential>,
    scope: Option<&str>,
    transport: &Transport,
    timeout: Duration,
) -> Result<AuthArtifact, AuthError> {
    match challenge {
        Challenge::Basic => match credential.and_then(Credential::basic_header) {
            Some(header) => Ok(AuthArtifact::Basic(header)),
            None => Err(AuthError::CredentialRequired),
        },
        Challenge::Bearer(bearer) => {
            let token = exchange_token(&bearer, credential, scope, transport, timeout).await?;
            Ok(AuthArtifact::Bearer(token))
        }
    }
}

/// Obtain a bearer token from the challenge realm.
///
/// The exchange is attempted even without a credential; many registries
/// issue anonymous read tokens.
async fn exchange_token(
    bearer: &BearerChallenge,
    credential: Option<&Credential>,
    scope: Option<&str>,
    transport: &Transport,
    timeout: Duration,
) -> Result<Token, AuthError> {
    // The repository scope derived from the request wins over the scope the
    // challenge suggested.
    let scope = scope.or(bearer.scope.as_deref());
    let service = bearer.service.as_deref();

    tracing::debug!(
        realm = %bearer.realm,
        scope = scope.unwrap_or("<global>"),
        "exchanging credentials for a bearer token"
    );

    let request = match credential {
        Some(Credential::OAuth2 {
            client_id,
            client_secret,
        }) => {
            let form = ClientCredentialsForm {
                grant_type: "client_credentials",
                service,
                scope,
                client_id,
                client_secret: client_secret.revealed(),
            };
            let body =
                serde_urlencoded::to_string(&form).map_err(|error| AuthError::Body(error.into()))?;
            Request::post(bearer.realm.clone())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(Bytes::from(body)))
                .map_err(|error| AuthError::Body(error.into()))?
        }
        _ => {
            let query = serde_urlencoded::to_string(ExchangeQuery { service, scope })
                .map_err(|error| AuthError::Body(error.into()))?;
            let uri = append_query(&bearer.realm, &query)?;

            let mut builder = Request::get(uri);
            if let Some(header) = credential.and_then(Credential::basic_header) {
                builder = builder.header(AUTHORIZATION, header);
            }
            builder
                .body(Body::empty())
                .map_err(|error| AuthError::Body(error.into()))?
        }
    };

    let response = send_raw(transport, request, timeout).await?;
    let status = response.status();
    if !status.is_success() {
        let message = response::text(response.into_body())
            .await
            .unwrap_or_default();
        tracing::warn!(realm = %bearer.realm, %status, "token exchange rejected");
        return Err(AuthError::TokenExchangeFailed { status, message });
    }

    let bytes = response::bytes(response.into_body())
        .await
        .map_err(AuthError::Body)?;
    let decoded: TokenResponse =
        serde_json::from_slice(&bytes).map_err(|error| AuthError::Body(error.into()))?;

    let value = decoded
        .token
        .or(decoded.access_token)
        .ok_or_else(|| AuthError::TokenExchangeFailed {
            status,
            message: "no token in exchange response".to_owned(),
        })?;

    let ttl = decoded.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECONDS);
    let expires_at = Utc::now() + chrono::Duration::seconds(ttl);

    Ok(Token::new(Secret::from(value), Some(expires_at)))
}

/// Append exchange parameters to the realm URI, preserving any query it
/// already carries.
fn append_query(realm: &Uri, query: &str) -> Result<Uri, AuthError> {
    if query.is_empty() {
        return Ok(realm.clone());
    }

    let merged = match realm.query() {
        Some(existing) if !existing.is_empty() => {
            format!("{}?{existing}&{query}", realm.path())
        }
        _ => format!("{}?{query}", realm.path()),
    };

    let mut parts = realm.clone().into_parts();
    parts.path_and_query = Some(
        merged
            .parse()
            .map_err(|error| AuthError::MalformedChallenge(format!("invalid realm: {error}")))?,
    );
    Uri::from_parts(parts)
        .map_err(|error| AuthError::MalformedChallenge(format!("invalid realm: {error}")))
}
