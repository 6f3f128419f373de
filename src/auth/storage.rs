use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::auth::token::{AccessToken, UserAccount};

/// OIDC scopes that never select a resource token
const RESERVED_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

/// Normalized cache key for a set of resource scopes
pub fn scope_key<S: AsRef<str>>(scopes: &[S]) -> String {
    let mut normalized: Vec<String> = scopes
        .iter()
        .map(|s| s.as_ref().trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty() && !RESERVED_SCOPES.contains(&s.as_str()))
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized.join(" ")
}

fn access_token_key(home_account_id: &str, scopes: &str) -> String {
    format!("{home_account_id}|{scopes}")
}

/// In-memory view of everything the identity client remembers.
///
/// Maps are ordered so the persisted form hashes the same way every time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenCache {
    /// Accounts in the order they first signed in
    accounts: Vec<UserAccount>,
    /// Refresh token per home account id
    refresh_tokens: BTreeMap<String, String>,
    /// Access token per account and scope key
    access_tokens: BTreeMap<String, AccessToken>,
}

impl TokenCache {
    pub fn accounts(&self) -> &[UserAccount] {
        &self.accounts
    }

    /// Add an account or refresh its profile fields in place
    pub fn upsert_account(&mut self, account: UserAccount) {
        match self
            .accounts
            .iter_mut()
            .find(|a| a.home_account_id == account.home_account_id)
        {
            Some(existing) => *existing = account,
            None => self.accounts.push(account),
        }
    }

    pub fn refresh_token(&self, home_account_id: &str) -> Option<&str> {
        self.refresh_tokens.get(home_account_id).map(String::as_str)
    }

    pub fn set_refresh_token(&mut self, home_account_id: &str, refresh_token: String) {
        self.refresh_tokens
            .insert(home_account_id.to_string(), refresh_token);
    }

    /// Look up the access token issued for these scopes
    pub fn access_token<S: AsRef<str>>(
        &self,
        home_account_id: &str,
        scopes: &[S],
    ) -> Option<&AccessToken> {
        self.access_tokens
            .get(&access_token_key(home_account_id, &scope_key(scopes)))
    }

    /// Store a token under the scopes it was requested for, replacing any older one
    pub fn store_access_token<S: AsRef<str>>(
        &mut self,
        home_account_id: &str,
        scopes: &[S],
        token: AccessToken,
    ) {
        self.access_tokens
            .insert(access_token_key(home_account_id, &scope_key(scopes)), token);
    }

    /// Drop an access token that the provider no longer honors
    pub fn remove_access_token<S: AsRef<str>>(&mut self, home_account_id: &str, scopes: &[S]) {
        self.access_tokens
            .remove(&access_token_key(home_account_id, &scope_key(scopes)));
    }

    pub fn remove_refresh_token(&mut self, home_account_id: &str) {
        self.refresh_tokens.remove(home_account_id);
    }

    pub fn clear(&mut self) {
        self.accounts.clear();
        self.refresh_tokens.clear();
        self.access_tokens.clear();
    }
}

/// On-disk envelope with an integrity check
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFilePayload {
    cache: TokenCache,
    saved_at: chrono::DateTime<Utc>,
    integrity_hash: String,
}

/// Persists the token cache as a JSON file between runs
#[derive(Debug, Clone)]
pub struct TokenCacheStore {
    path: PathBuf,
}

impl TokenCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cache file, `None` when nothing has been saved yet
    pub async fn load(&self) -> Result<Option<TokenCache>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No token cache file found");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };

        let payload: CacheFilePayload =
            serde_json::from_str(&contents).context("token cache file is not valid JSON")?;

        let expected_hash = Self::integrity_hash(&payload.cache)?;
        if expected_hash != payload.integrity_hash {
            error!(
                path = %self.path.display(),
                "Token cache integrity check failed, possible tampering"
            );
            return Err(anyhow!("Token cache integrity check failed"));
        }

        debug!(
            path = %self.path.display(),
            accounts = payload.cache.accounts().len(),
            "Token cache loaded"
        );
        Ok(Some(payload.cache))
    }

    /// Write the cache file, creating parent directories as needed
    pub async fn save(&self, cache: &TokenCache) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let payload = CacheFilePayload {
            cache: cache.clone(),
            saved_at: Utc::now(),
            integrity_hash: Self::integrity_hash(cache)?,
        };
        let contents = serde_json::to_string_pretty(&payload)?;

        tokio::fs::write(&self.path, contents)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Token cache saved");
        Ok(())
    }

    /// Remove the cache file if it exists
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Token cache file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }

    fn integrity_hash(cache: &TokenCache) -> Result<String> {
        let serialized = serde_json::to_vec(cache)?;
        Ok(format!("{:x}", Sha256::digest(&serialized)))
    }
}
