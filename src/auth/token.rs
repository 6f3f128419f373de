use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Values a front end may hand over in place of a missing token
const NULL_SENTINELS: &[&str] = &["null", "undefined"];

/// Bearer token authorizing calls to the downstream resource.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The opaque bearer value
    secret: String,

    /// When the token expires (if known)
    expires_on: Option<DateTime<Utc>>,

    /// The scopes this token was issued for
    scopes: Vec<String>,
}

impl AccessToken {
    /// Create a new access token
    pub fn new(
        secret: impl Into<String>,
        expires_on: Option<DateTime<Utc>>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            expires_on,
            scopes,
        }
    }

    /// Token issued now that lives for `expires_in` seconds.
    ///
    /// A lifetime past what a timestamp can hold leaves the expiry unknown.
    pub fn expiring_in(secret: impl Into<String>, expires_in: i64, scopes: Vec<String>) -> Self {
        let expires_on =
            Duration::try_seconds(expires_in).and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self::new(secret, expires_on, scopes)
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        self.expires_on
    }

    /// True for empty or null-sentinel values
    pub fn is_blank(&self) -> bool {
        let secret = self.secret.trim();
        secret.is_empty() || NULL_SENTINELS.iter().any(|s| secret.eq_ignore_ascii_case(s))
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.expires_on.is_some_and(|exp| exp <= Utc::now())
    }

    /// Check if the token expires within the given threshold
    pub fn expires_within(&self, threshold_secs: i64) -> bool {
        self.expires_on
            .is_some_and(|exp| (exp - Utc::now()).num_seconds() < threshold_secs)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[redacted]")
            .field("expires_on", &self.expires_on)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Principal issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    /// Stable identifier, `{object id}.{tenant id}` when the tenant is known
    pub home_account_id: String,
    /// Tenant the account signed in to
    pub tenant_id: Option<String>,
    /// Sign-in name, usually the UPN or email
    pub username: String,
    /// Display name
    pub name: Option<String>,
}

impl UserAccount {
    /// Name shown in the UI, falling back to the username
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.username)
    }
}

/// Successful response from the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Error body returned by the authorize and token endpoints
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Claims read from an ID token
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct IdTokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub tid: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a compact JWT.
    ///
    /// The token arrives straight from the token endpoint over TLS, so the
    /// signature is not checked here.
    pub fn decode(id_token: &str) -> Result<Self, AuthError> {
        let mut segments = id_token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) => payload,
            _ => return Err(AuthError::invalid_response("malformed id token")),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::invalid_response(format!("id token payload: {e}")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::invalid_response(format!("id token claims: {e}")))
    }

    /// Build the account these claims describe
    pub fn to_account(&self) -> Result<UserAccount, AuthError> {
        let object_id = self
            .oid
            .as_deref()
            .or(self.sub.as_deref())
            .ok_or_else(|| AuthError::invalid_response("id token has no subject"))?;

        let home_account_id = match &self.tid {
            Some(tid) => format!("{object_id}.{tid}"),
            None => object_id.to_string(),
        };

        let username = self
            .preferred_username
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| object_id.to_string());

        Ok(UserAccount {
            home_account_id,
            tenant_id: self.tid.clone(),
            username,
            name: self.name.clone(),
        })
    }
}
