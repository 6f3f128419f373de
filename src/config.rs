use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ConfigError;

// Environment keys
pub const CLIENT_ID_KEY: &str = "AZURE_AD_CLIENT_ID";
pub const TENANT_ID_KEY: &str = "AZURE_AD_TENANT_ID";
pub const REDIRECT_URI_KEY: &str = "AZURE_AD_REDIRECT_URI";
pub const AUTHORITY_HOST_KEY: &str = "AZURE_AD_AUTHORITY_HOST";
pub const DYNAMICS_URL_KEY: &str = "DYNAMICS_URL";
pub const API_VERSION_KEY: &str = "DYNAMICS_API_VERSION";
pub const BIND_ADDR_KEY: &str = "PORTAL_BIND_ADDR";
pub const TOKEN_CACHE_KEY: &str = "PORTAL_TOKEN_CACHE";
pub const INTERACTION_TIMEOUT_KEY: &str = "PORTAL_INTERACTION_TIMEOUT_SECS";

// Default configuration values
const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000";
const DEFAULT_API_VERSION: &str = "9.2";
const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_INTERACTION_TIMEOUT_SECS: u64 = 300;

/// Scopes requested by the identity-only sign-in
pub const IDENTITY_SCOPES: &[&str] = &["openid", "profile", "email"];

/// Immutable configuration snapshot for one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Identity provider settings
    pub identity: IdentityConfig,
    /// Downstream CRM resource settings
    pub resource: ResourceConfig,
    /// HTTP server settings
    pub server: ServerConfig,
}

/// Identity provider settings for the public client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Application (client) id registered with the identity provider
    pub client_id: String,
    /// Tenant identifier used to build the authority
    pub tenant_id: String,
    /// Authority URL, e.g. `https://login.microsoftonline.com/{tenant}`
    pub authority: Url,
    /// Redirect URI registered for the application
    pub redirect_uri: Url,
    /// Scopes requested at sign-in
    pub scopes: Vec<String>,
}

/// Downstream CRM resource settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Organization URL without trailing slash
    pub dynamics_url: String,
    /// Web API version, e.g. `9.2`
    pub api_version: String,
    /// Web API root, `{dynamics_url}/api/data/v{api_version}`
    pub base_url: String,
    /// Scopes authorizing access to the resource
    pub scopes: Vec<String>,
}

impl ResourceConfig {
    /// Build resource settings from an organization URL and API version
    pub fn new(dynamics_url: &str, api_version: &str) -> Self {
        let dynamics_url = dynamics_url.trim_end_matches('/').to_string();
        Self {
            base_url: format!("{dynamics_url}/api/data/v{api_version}"),
            scopes: vec![format!("{dynamics_url}/.default")],
            api_version: api_version.to_string(),
            dynamics_url,
        }
    }

    /// Settings exposed to authenticated clients
    pub fn settings(&self) -> ResourceSettings {
        ResourceSettings {
            base_url: self.base_url.clone(),
            dynamics_url: self.dynamics_url.clone(),
            api_version: self.api_version.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

impl IdentityConfig {
    /// Settings exposed before authentication
    pub fn settings(&self) -> IdentitySettings {
        IdentitySettings {
            client_id: self.client_id.clone(),
            authority: self.authority.to_string(),
            redirect_uri: self.redirect_uri.to_string(),
            login_scopes: self.scopes.clone(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the portal listens on
    pub bind_addr: SocketAddr,
    /// Where the token cache is persisted, memory-only when unset
    pub token_cache_path: Option<PathBuf>,
    /// How long an interactive prompt waits for the user
    pub interaction_timeout: Duration,
}

/// Identity configuration as served to the view layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySettings {
    pub client_id: String,
    pub authority: String,
    pub redirect_uri: String,
    pub login_scopes: Vec<String>,
}

/// Resource configuration as served to authenticated clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSettings {
    pub base_url: String,
    pub dynamics_url: String,
    pub api_version: String,
    pub scopes: Vec<String>,
}

impl Configuration {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Empty values count as absent. Required keys are checked in the order
    /// client id, tenant id, resource URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::missing(key));

        let client_id = required(CLIENT_ID_KEY)?;
        let tenant_id = required(TENANT_ID_KEY)?;
        let dynamics_url = required(DYNAMICS_URL_KEY)?;

        let dynamics = parse_url(DYNAMICS_URL_KEY, &dynamics_url)?;
        if !matches!(dynamics.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                DYNAMICS_URL_KEY,
                &dynamics_url,
                "expected an http(s) URL",
            ));
        }

        let api_version = get(API_VERSION_KEY).unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        if !api_version.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(ConfigError::invalid(
                API_VERSION_KEY,
                &api_version,
                "expected a dotted version such as 9.2",
            ));
        }

        let redirect_uri = get(REDIRECT_URI_KEY).unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let redirect_uri = parse_url(REDIRECT_URI_KEY, &redirect_uri)?;

        let authority_host =
            get(AUTHORITY_HOST_KEY).unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());
        let authority = format!("{}/{}", authority_host.trim_end_matches('/'), tenant_id);
        let authority = parse_url(AUTHORITY_HOST_KEY, &authority)?;

        let bind_addr = get(BIND_ADDR_KEY).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid(BIND_ADDR_KEY, &bind_addr, e))?;

        let interaction_timeout = match get(INTERACTION_TIMEOUT_KEY) {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::invalid(INTERACTION_TIMEOUT_KEY, &raw, e))?,
            None => Duration::from_secs(DEFAULT_INTERACTION_TIMEOUT_SECS),
        };

        let config = Self {
            identity: IdentityConfig {
                client_id,
                tenant_id,
                authority,
                redirect_uri,
                scopes: IDENTITY_SCOPES.iter().map(|s| s.to_string()).collect(),
            },
            resource: ResourceConfig::new(&dynamics_url, &api_version),
            server: ServerConfig {
                bind_addr,
                token_cache_path: get(TOKEN_CACHE_KEY).map(PathBuf::from),
                interaction_timeout,
            },
        };

        debug!(
            authority = %config.identity.authority,
            resource = %config.resource.base_url,
            "Configuration loaded"
        );

        Ok(config)
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::invalid(key, value, e))
}
