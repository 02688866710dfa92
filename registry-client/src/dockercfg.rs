//! Credential selection from a Docker config (`.dockerconfigjson`).
//!
//! Registries appear under `auths` with keys in several historical formats:
//! bare hostnames, full URLs, URLs with ports or paths, and subdomain
//! variants. Selection tries an exact key match first, then the key's URL
//! hostname, then the registered domain with subdomains stripped.

use std::collections::HashMap;

use registry_auth::{Credential, Secret};
use serde::Deserialize;
use url::Url;

use crate::canonical_host;

/// Parsed `dockerconfigjson` contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuth>,
}

/// One `auths` entry. Only the pre-encoded `auth` pair is consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct DockerAuth {
    #[serde(default)]
    auth: Option<Secret>,
}

impl DockerAuth {
    fn credential(&self) -> Option<Credential> {
        self.auth.clone().map(Credential::Encoded)
    }
}

impl DockerConfig {
    /// Parse a `dockerconfigjson` string.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Find the credential for a registry host, following the key formats
    /// Docker has used over the years. The first matching entry wins, even
    /// when it carries no usable `auth` value.
    pub fn credential_for(&self, host: &str) -> Option<Credential> {
        let canonical = canonical_host(host);
        let matches = |candidate: &str| candidate == host || candidate == canonical;

        for (key, auth) in &self.auths {
            if key.is_empty() {
                continue;
            }

            if matches(key) {
                return auth.credential();
            }

            let with_scheme = if key.contains("://") {
                key.clone()
            } else {
                format!("https://{key}")
            };
            let Ok(parsed) = Url::parse(&with_scheme) else {
                continue;
            };
            let Some(hostname) = parsed.host_str() else {
                continue;
            };

            if matches(hostname) {
                return auth.credential();
            }

            // index.quay.io and quay.io share credentials.
            let labels: Vec<&str> = hostname.split('.').collect();
            if labels.len() > 2 {
                let domain = labels[labels.len() - 2..].join(".");
                if matches(&domain) {
                    return auth.credential();
                }
            }
        }

        None
    }
}
