//! Token storage and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use super::Account;

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: u64 = 300;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Stored access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<u64>,
}

impl StoredToken {
    pub fn new(token: String, expires_in_secs: Option<u64>) -> Self {
        let expires_at = expires_in_secs.map(|secs| now_secs() + secs);
        Self { token, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(exp) => now + EXPIRY_SKEW_SECS >= exp,
            None => false,
        }
    }
}

/// Cache key for a scope set: lowercase, sorted, space separated.
pub fn scope_key(scopes: &[String]) -> String {
    let mut parts: Vec<String> = scopes.iter().map(|s| s.to_ascii_lowercase()).collect();
    parts.sort();
    parts.dedup();
    parts.join(" ")
}

/// Everything the identity layer remembers between calls.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCache {
    pub refresh_token: Option<String>,
    pub account: Option<Account>,
    /// Access tokens keyed by [`scope_key`]
    #[serde(default)]
    pub access_tokens: BTreeMap<String, StoredToken>,
}

impl TokenCache {
    /// Cached, unexpired access token for `scopes`.
    pub fn access_token_for(&self, scopes: &[String]) -> Option<&StoredToken> {
        self.access_tokens
            .get(&scope_key(scopes))
            .filter(|t| !t.is_expired())
    }

    pub fn insert_access_token(&mut self, scopes: &[String], token: StoredToken) {
        self.access_tokens.insert(scope_key(scopes), token);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Token store trait for different storage backends
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<TokenCache>;
    fn save(&self, cache: &TokenCache) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Session-scoped store: nothing outlives the process.
#[derive(Debug, Default)]
pub struct MemoryStore;

impl TokenStore for MemoryStore {
    fn load(&self) -> Result<TokenCache> {
        Ok(TokenCache::default())
    }

    fn save(&self, _cache: &TokenCache) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// TOML file store with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TokenStore for FileStore {
    fn load(&self) -> Result<TokenCache> {
        if !self.path.exists() {
            return Ok(TokenCache::default());
        }
        let content = fs::read_to_string(&self.path).context("Failed to read token cache")?;
        toml::from_str(&content).context("Failed to parse token cache")
    }

    fn save(&self, cache: &TokenCache) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create token cache directory")?;
        }

        let content = toml::to_string_pretty(cache).context("Failed to serialize token cache")?;
        fs::write(&self.path, content).context("Failed to write token cache")?;

        // Set restrictive permissions on the cache file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms)
                .context("Failed to set token cache permissions")?;
        }

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to remove token cache")?;
        }
        Ok(())
    }
}
