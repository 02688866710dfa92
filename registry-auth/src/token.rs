//! Bearer tokens and the per-scope token cache.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::secret::Secret;

/// Lifetime assumed for tokens whose exchange response carries no
/// `expires_in`. A short TTL bounds how long a token of unknown lifetime
/// can be reused.
pub(crate) const DEFAULT_TOKEN_TTL_SECONDS: i64 = 300;

/// A bearer token obtained from an authorization realm.
#[derive(Debug, Clone)]
pub struct Token {
    value: Secret,
    expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Create a token with an optional expiry instant.
    pub fn new(value: Secret, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { value, expires_at }
    }

    /// The token value.
    pub fn secret(&self) -> &Secret {
        &self.value
    }

    /// Whether the token is unusable at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }
}

/// Cache key: one token per registry host and scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    /// Registry host the token authenticates against.
    pub host: String,

    /// Token scope; `None` implies global access.
    pub scope: Option<String>,
}

/// Process-scoped cache of bearer tokens keyed by `(host, scope)`.
///
/// Expiry is lazy: reading an expired entry evicts it and reports a miss.
/// Reads and evictions are atomic per key, so concurrent refreshes cannot
/// corrupt the map; the last completed exchange wins.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: DashMap<TokenKey, Token>,
}

impl TokenCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live token, evicting it if it has expired.
    pub fn get(&self, key: &TokenKey) -> Option<Token> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &TokenKey, now: DateTime<Utc>) -> Option<Token> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                if entry.get().is_expired_at(now) {
                    entry.remove();
                    None
                } else {
                    Some(entry.get().clone())
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Store a token, replacing any previous entry for the key.
    pub fn put(&self, key: TokenKey, token: Token) {
        self.entries.insert(key, token);
    }

    /// Drop the token for a key, if any.
    pub fn invalidate(&self, key: &TokenKey) {
        self.entries.remove(key);
    }
}
