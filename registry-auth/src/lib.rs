//! Authentication pipeline for Docker/OCI distribution registries.
//!
//! The registry protocol leaves scheme discovery to the first rejected
//! request: a call is answered with `401 Unauthorized` and a
//! `WWW-Authenticate` challenge naming `Basic` or `Bearer` authentication.
//! [`Authenticator`] owns that handshake. It sends the request, parses the
//! challenge, resolves the configured [`Credential`] (performing a token
//! exchange against the challenge realm for bearer schemes), caches the
//! resulting token per `(host, scope)`, and retries the original request
//! exactly once. A second rejection is terminal.
//!
//! All registry traffic funnels through [`Authenticator::execute`]; it is
//! the single place that enforces the retry bound and the only writer of
//! the token cache.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{Request, Response, StatusCode};
use hyperdriver::client::conn::transport::tcp::TcpTransportConfig;
use hyperdriver::service::SharedService;
use hyperdriver::{Body, Client};
use tower::ServiceExt as _;

mod challenge;
mod credentials;
mod error;
pub mod mock;
mod resolver;
pub mod response;
mod secret;
mod token;

pub use self::challenge::{parse_challenge, BearerChallenge, Challenge, ChallengeError};
pub use self::credentials::{basic_auth, Credential};
pub use self::error::AuthError;
pub use self::secret::Secret;
pub use self::token::{Token, TokenCache, TokenKey};

use self::resolver::AuthArtifact;

/// The HTTP service registry requests are sent through.
pub type Transport = hyperdriver::client::SharedClientService<Body, Body>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(7);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Sends registry requests, answering authentication challenges along the
/// way.
///
/// The credential can be swapped at runtime without rebuilding the client;
/// requests already in flight keep the credential they started with.
#[derive(Debug, Clone)]
pub struct Authenticator {
    transport: Transport,
    credential: Arc<ArcSwap<Option<Credential>>>,
    tokens: Arc<TokenCache>,
    actions: Arc<str>,
    timeout: Duration,
}

impl Authenticator {
    /// Build an authenticator with its own TLS-capable transport.
    pub fn new(credential: Option<Credential>) -> Self {
        let mut tcp = TcpTransportConfig::default();
        tcp.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);

        let transport = Client::builder()
            .with_tcp(tcp)
            .with_auto_http()
            .with_user_agent(USER_AGENT.to_owned())
            .build_service();

        Self::from_transport(transport, credential)
    }

    /// Build an authenticator over a custom transport service, e.g. a
    /// proxied client or a scripted test double.
    pub fn with_transport<S>(transport: S, credential: Option<Credential>) -> Self
    where
        S: tower::Service<
                Request<Body>,
                Response = Response<Body>,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self::from_transport(shared_transport(transport), credential)
    }

    /// Build an authenticator over an already-shared transport.
    pub fn from_transport(transport: Transport, credential: Option<Credential>) -> Self {
        Self {
            transport,
            credential: Arc::new(ArcSwap::new(Arc::new(credential))),
            tokens: Arc::new(TokenCache::new()),
            actions: Arc::from("pull"),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Access actions requested in derived token scopes (default `pull`).
    pub fn with_access<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = actions
            .into_iter()
            .map(|action| action.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(",");
        self.actions = Arc::from(joined.as_str());
        self
    }

    /// Replace the configured credential; takes effect on the next request.
    pub fn set_credential(&self, credential: Option<Credential>) {
        self.credential.store(Arc::new(credential));
    }

    /// Send a request, answering at most one authentication challenge.
    ///
    /// Responses other than `401 Unauthorized` pass through unchanged,
    /// whatever their status.
    pub async fn execute(&self, mut request: Request<Body>) -> Result<Response<Body>, AuthError> {
        let key = TokenKey {
            host: request.uri().host().unwrap_or_default().to_owned(),
            scope: scope_for_path(request.uri().path(), &self.actions),
        };

        if let Some(token) = self.tokens.get(&key) {
            tracing::trace!(host = %key.host, "using cached bearer token");
            if !request.headers().contains_key(AUTHORIZATION) {
                attach_bearer(&mut request, &token)?;
            } else {
                tracing::warn!("{} header already set", AUTHORIZATION);
            }
        }

        let retry = clone_request(&request);
        let response = self.send(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(mut retry) = retry else {
            tracing::debug!("request body cannot be replayed; passing the 401 through");
            return Ok(response);
        };

        let challenge = match response.headers().get(WWW_AUTHENTICATE) {
            Some(value) => {
                let text = value.to_str().map_err(|_| {
                    AuthError::MalformedChallenge("challenge header is not ASCII".to_owned())
                })?;
                parse_challenge(text)?
            }
            None => return Err(AuthError::AuthenticationRequired),
        };

        tracing::debug!(uri = %retry.uri(), "registry challenged the request; resolving credentials");
        let credential = self.credential.load_full();
        let artifact = resolver::resolve(
            challenge,
            credential.as_ref().as_ref(),
            key.scope.as_deref(),
            &self.transport,
            self.timeout,
        )
        .await?;

        match artifact {
            AuthArtifact::Basic(header) => {
                retry.headers_mut().insert(AUTHORIZATION, header);
            }
            AuthArtifact::Bearer(token) => {
                attach_bearer(&mut retry, &token)?;
                self.tokens.put(key.clone(), token);
            }
        }

        let response = self.send(retry).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // One retry only; a second rejection is terminal.
            self.tokens.invalidate(&key);
            return Err(AuthError::AuthenticationFailed);
        }

        Ok(response)
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, AuthError> {
        tracing::debug!(method = %request.method(), uri = %request.uri(), "sending registry request");
        send_raw(&self.transport, request, self.timeout).await
    }
}

/// Adapt a compatible `tower::Service` into the shared transport type.
pub fn shared_transport<S>(transport: S) -> Transport
where
    S: tower::Service<
            Request<Body>,
            Response = Response<Body>,
            Error = hyperdriver::client::Error,
        > + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    tower::ServiceBuilder::new()
        .layer(SharedService::layer())
        .service(transport)
}

/// Send a request through the transport under the configured timeout.
pub(crate) async fn send_raw(
    transport: &Transport,
    request: Request<Body>,
    timeout: Duration,
) -> Result<Response<Body>, AuthError> {
    match tokio::time::timeout(timeout, transport.clone().oneshot(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(error)) => Err(AuthError::Transport(error)),
        Err(_) => Err(AuthError::TransportTimeout),
    }
}

fn attach_bearer(request: &mut Request<Body>, token: &Token) -> Result<(), AuthError> {
    let header = token
        .secret()
        .bearer()
        .map_err(|error| AuthError::Body(error.into()))?;
    request.headers_mut().insert(AUTHORIZATION, header);
    Ok(())
}

/// Clone a request for the single authenticated retry. Fails when the body
/// is streaming and cannot be replayed.
fn clone_request(req: &Request<Body>) -> Option<Request<Body>> {
    let body = req.body().try_clone()?;

    let mut next = Request::builder()
        .method(req.method().clone())
        .uri(req.uri().clone())
        .version(req.version())
        .body(body)
        .unwrap();

    *next.extensions_mut() = req.extensions().clone();
    *next.headers_mut() = req.headers().clone();

    Some(next)
}

/// Derive the token scope for a registry request path.
///
/// `/v2/<repo>/{manifests,tags,blobs}/…` maps to
/// `repository:<repo>:<actions>`; repository names may themselves contain
/// slashes, so the rightmost marker wins. Other paths imply global access.
fn scope_for_path(path: &str, actions: &str) -> Option<String> {
    let rest = path.strip_prefix("/v2/")?;

    let cut = ["/manifests/", "/tags/", "/blobs/"]
        .iter()
        .filter_map(|marker| rest.rfind(marker))
        .max()?;
    if cut == 0 {
        return None;
    }

    Some(format!("repository:{}:{actions}", &rest[..cut]))
}
