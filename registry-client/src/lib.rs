//! Client for the Docker/OCI distribution registry HTTP API.
//!
//! [`RegistryClient`] resolves authentication through
//! [`registry_auth::Authenticator`] and exposes the read operations of the
//! v2 protocol: tag listing with `Link` pagination and manifest retrieval
//! with media-type negotiation.
//!
//! # Example
//!
//! ```no_run
//! use registry_client::{MediaType, RegistryClient};
//!
//! # async fn example() -> Result<(), registry_client::RegistryError> {
//! let client = RegistryClient::builder("quay.io").build()?;
//! let tags = client.list_tags("prometheus/node-exporter").await?;
//! let manifest = client
//!     .get_manifest("prometheus/node-exporter", "latest", &[MediaType::OciIndex])
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Request, StatusCode, Uri};
use hyperdriver::Body;
use registry_auth::{response, Authenticator, Transport};
use serde::Deserialize;
use url::Url;

mod dockercfg;
mod error;
mod manifest;
mod paginate;

pub use registry_auth::{AuthError, Credential, Secret};

pub use self::dockercfg::{DockerAuth, DockerConfig};
pub use self::error::RegistryError;
pub use self::manifest::{
    Descriptor, ImageIndex, ImageManifest, Manifest, MediaType, Platform,
};

const DEFAULT_PAGE_SIZE: usize = 100;
const DIGEST_HEADER: &str = "docker-content-digest";

/// Docker Hub content lives on `index.docker.io` whatever alias the caller
/// used for it.
const DOCKER_ALIASES: [(&str, &str); 3] = [
    ("docker.io", "index.docker.io"),
    ("registry-1.docker.io", "index.docker.io"),
    ("hub.docker.com", "index.docker.io"),
];

pub(crate) fn canonical_host(host: &str) -> &str {
    DOCKER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == host)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(host)
}

/// Configuration for a [`RegistryClient`].
#[derive(Debug)]
pub struct RegistryClientBuilder {
    host: String,
    credential: Option<Credential>,
    page_size: usize,
    access: Vec<String>,
    timeout: Option<Duration>,
    transport: Option<Transport>,
}

impl RegistryClientBuilder {
    /// Attach a credential.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Take the credential for this host from a Docker config, when it has
    /// one.
    pub fn docker_config(mut self, config: &DockerConfig) -> Self {
        if let Some(credential) = config.credential_for(&self.host) {
            self.credential = Some(credential);
        }
        self
    }

    /// Tags requested per page (the server may clamp it).
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Access actions requested in token scopes (default `pull`).
    pub fn access<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.access = actions
            .into_iter()
            .map(|action| action.as_ref().to_owned())
            .collect();
        self
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a custom transport service: a proxied client, an alternative TLS
    /// stack, or a scripted test double.
    pub fn transport<S>(mut self, transport: S) -> Self
    where
        S: tower::Service<
                Request<Body>,
                Response = http::Response<Body>,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.transport = Some(registry_auth::shared_transport(transport));
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RegistryClient, RegistryError> {
        let host = canonical_host(&self.host);
        let with_scheme = if host.contains("://") {
            host.to_owned()
        } else {
            format!("https://{host}")
        };
        let base = Url::parse(&with_scheme)
            .map_err(|error| RegistryError::InvalidUrl(format!("{host}: {error}")))?;

        let mut authenticator = match self.transport {
            Some(transport) => Authenticator::from_transport(transport, self.credential),
            None => Authenticator::new(self.credential),
        };
        if let Some(timeout) = self.timeout {
            authenticator = authenticator.with_timeout(timeout);
        }
        if !self.access.is_empty() {
            authenticator = authenticator.with_access(&self.access);
        }

        Ok(RegistryClient {
            base,
            authenticator,
            page_size: self.page_size,
        })
    }
}

/// A client for one registry host.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base: Url,
    authenticator: Authenticator,
    page_size: usize,
}

/// The `tags/list` response document. `tags` is `null` for repositories
/// with no tags on some registries.
#[derive(Debug, Deserialize)]
struct TagList {
    tags: Option<Vec<String>>,
}

impl RegistryClient {
    /// Start building a client for `host`. The scheme defaults to `https`
    /// and Docker Hub aliases normalize to `index.docker.io`.
    pub fn builder(host: impl Into<String>) -> RegistryClientBuilder {
        RegistryClientBuilder {
            host: host.into(),
            credential: None,
            page_size: DEFAULT_PAGE_SIZE,
            access: Vec::new(),
            timeout: None,
            transport: None,
        }
    }

    /// The registry this client talks to.
    pub fn host(&self) -> &str {
        self.base.host_str().unwrap_or_default()
    }

    /// Replace the configured credential; takes effect on the next request.
    pub fn set_credential(&self, credential: Option<Credential>) {
        self.authenticator.set_credential(credential);
    }

    /// List every tag in a repository, draining pagination fully before
    /// returning. Tags arrive in server order with no duplicates dropped or
    /// introduced.
    #[tracing::instrument(skip(self))]
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        self.collect_tags(repository, None).await
    }

    /// List at most `limit` tags from a repository, stopping pagination
    /// early once the limit is reached.
    #[tracing::instrument(skip(self))]
    pub async fn list_tags_limited(
        &self,
        repository: &str,
        limit: usize,
    ) -> Result<Vec<String>, RegistryError> {
        self.collect_tags(repository, Some(limit)).await
    }

    async fn collect_tags(
        &self,
        repository: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, RegistryError> {
        let mut tags = Vec::new();
        let mut next = Some(self.endpoint(&format!(
            "v2/{repository}/tags/list?n={}",
            self.page_size
        ))?);

        while let Some(uri) = next.take() {
            let request = Request::get(uri).body(Body::empty()).unwrap();
            let response = self.send(request).await?;

            let next_uri = paginate::next_page(&self.base, response.headers())?;
            let bytes = response::bytes(response.into_body())
                .await
                .map_err(RegistryError::Body)?;
            let page: TagList = serde_json::from_slice(&bytes)?;
            tags.extend(page.tags.unwrap_or_default());

            if let Some(limit) = limit {
                if tags.len() >= limit {
                    tags.truncate(limit);
                    break;
                }
            }

            next = next_uri;
        }

        Ok(tags)
    }

    /// Fetch a manifest by tag or digest, negotiating one of the given
    /// media types. An empty slice requests the default image-manifest
    /// pair.
    ///
    /// A response typed outside the requested set is a
    /// [`RegistryError::UnexpectedMediaType`]; the payload is never
    /// relabeled as something the caller asked for.
    #[tracing::instrument(skip(self, types))]
    pub async fn get_manifest(
        &self,
        repository: &str,
        reference: &str,
        types: &[MediaType],
    ) -> Result<Manifest, RegistryError> {
        let types = if types.is_empty() {
            &MediaType::DEFAULT_MANIFEST_TYPES[..]
        } else {
            types
        };
        let accept = accept_header(types);

        let uri = self.endpoint(&format!("v2/{repository}/manifests/{reference}"))?;
        let request = Request::get(uri)
            .header(ACCEPT, accept)
            .body(Body::empty())
            .unwrap();
        let response = self.send(request).await?;

        let received = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("(none)")
            .to_owned();
        let Some(media) =
            MediaType::from_content_type(&received).filter(|media| types.contains(media))
        else {
            return Err(RegistryError::UnexpectedMediaType { received });
        };

        let bytes = response::bytes(response.into_body())
            .await
            .map_err(RegistryError::Body)?;
        let manifest = Manifest::from_slice(media, &bytes)?;

        // The document may declare its own type; it must be one the caller
        // asked for as well.
        if let Some(inner) = manifest.media_type() {
            if !types.iter().any(|media| media.as_str() == inner) {
                return Err(RegistryError::UnexpectedMediaType {
                    received: inner.to_owned(),
                });
            }
        }

        Ok(manifest)
    }

    /// The digest for a manifest reference, from the
    /// `Docker-Content-Digest` header of a HEAD request.
    #[tracing::instrument(skip(self))]
    pub async fn manifest_digest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<String, RegistryError> {
        let uri = self.endpoint(&format!("v2/{repository}/manifests/{reference}"))?;
        let request = Request::head(uri)
            .header(ACCEPT, accept_header(&MediaType::MANIFEST_TYPES))
            .body(Body::empty())
            .unwrap();
        let response = self.send(request).await?;

        response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or(RegistryError::MissingDigest)
    }

    fn endpoint(&self, path: &str) -> Result<Uri, RegistryError> {
        let url = self
            .base
            .join(path)
            .map_err(|error| RegistryError::InvalidUrl(error.to_string()))?;
        url.as_str()
            .parse()
            .map_err(|_| RegistryError::InvalidUrl(url.into()))
    }

    async fn send(&self, request: Request<Body>) -> Result<http::Response<Body>, RegistryError> {
        let uri = request.uri().clone();
        tracing::debug!(%uri, "querying registry");

        let response = self.authenticator.execute(request).await?;
        let status = response.status();
        log_response(status, &uri);

        if status.is_success() {
            return Ok(response);
        }

        let body = response::text(response.into_body())
            .await
            .unwrap_or_default();
        Err(RegistryError::Upstream { status, body })
    }
}

fn accept_header(types: &[MediaType]) -> String {
    types
        .iter()
        .map(MediaType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn log_response(status: StatusCode, uri: &Uri) {
    if status.is_client_error() {
        tracing::warn!(%status, %uri, "registry rejected the request");
    } else if status.is_server_error() {
        tracing::error!(%status, %uri, "registry failed to serve the request");
    } else {
        tracing::debug!(%status, %uri, "registry request succeeded");
    }
}
