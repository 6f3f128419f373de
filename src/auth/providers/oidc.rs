use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::pkce::{self, PkcePair};
use crate::auth::providers::{
    AuthorizationOutcome, AuthorizationRequest, IdentityClient, InteractionKind,
    InteractionSurface, SignInResult,
};
use crate::auth::storage::{TokenCache, TokenCacheStore};
use crate::auth::token::{
    AccessToken, IdTokenClaims, OAuthErrorResponse, TokenResponse, UserAccount,
};
use crate::config::IdentityConfig;
use crate::error::{AuthError, SilentAuthError};
use crate::http_client::HttpClient;

// Microsoft identity platform v2 endpoints, relative to the authority
const AUTHORIZE_PATH: &str = "oauth2/v2.0/authorize";
const TOKEN_PATH: &str = "oauth2/v2.0/token";
const LOGOUT_PATH: &str = "oauth2/v2.0/logout";

/// Scopes added to every request so an ID token and refresh token come back
const PROTOCOL_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// Cached tokens this close to expiry are refreshed instead of reused
const EXPIRY_SKEW_SECS: i64 = 300;

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Provider errors that mean only the user can fix things
const INTERACTION_REQUIRED_ERRORS: &[&str] = &[
    "invalid_grant",
    "interaction_required",
    "consent_required",
    "login_required",
];

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Settings resolved by `initialize`
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClientSettings {
    client_id: String,
    redirect_uri: Url,
    authorize_endpoint: Url,
    token_endpoint: String,
    logout_endpoint: Url,
}

impl ClientSettings {
    fn from_config(config: &IdentityConfig) -> Result<Self, AuthError> {
        let authority = config.authority.as_str().trim_end_matches('/');
        let endpoint = |path: &str| {
            Url::parse(&format!("{authority}/{path}"))
                .map_err(|e| AuthError::invalid_response(format!("authority {authority}: {e}")))
        };

        Ok(Self {
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            authorize_endpoint: endpoint(AUTHORIZE_PATH)?,
            token_endpoint: endpoint(TOKEN_PATH)?.to_string(),
            logout_endpoint: endpoint(LOGOUT_PATH)?,
        })
    }
}

/// Ways a token endpoint call can fail
#[derive(Debug)]
enum TokenEndpointError {
    Transport(String),
    Provider { error: String, description: String },
    Malformed(String),
}

impl From<TokenEndpointError> for AuthError {
    fn from(err: TokenEndpointError) -> Self {
        match err {
            TokenEndpointError::Transport(reason) => AuthError::Network { reason },
            TokenEndpointError::Provider { error, description } => {
                AuthError::Rejected { error, description }
            }
            TokenEndpointError::Malformed(reason) => AuthError::InvalidResponse { reason },
        }
    }
}

impl From<TokenEndpointError> for SilentAuthError {
    fn from(err: TokenEndpointError) -> Self {
        match err {
            TokenEndpointError::Transport(reason) => SilentAuthError::Network { reason },
            TokenEndpointError::Provider { error, description }
                if INTERACTION_REQUIRED_ERRORS.contains(&error.as_str()) =>
            {
                SilentAuthError::InteractionRequired {
                    reason: format!("{error}: {description}"),
                }
            }
            TokenEndpointError::Provider { error, description } => {
                SilentAuthError::Rejected { error, description }
            }
            TokenEndpointError::Malformed(reason) => SilentAuthError::Network { reason },
        }
    }
}

/// Outcome of a completed interactive authorization
struct InteractiveGrant {
    response: TokenResponse,
    claims: Option<IdTokenClaims>,
}

/// OAuth2 public client for the Microsoft identity platform.
///
/// Interactive requests use the authorization code flow with PKCE through an
/// [`InteractionSurface`]. Silent requests reuse cached access tokens or redeem
/// the account's refresh token.
pub struct OidcPublicClient {
    http: Arc<dyn HttpClient>,
    surface: Arc<dyn InteractionSurface>,
    store: Option<TokenCacheStore>,
    settings: RwLock<Option<ClientSettings>>,
    cache: RwLock<TokenCache>,
}

impl OidcPublicClient {
    pub fn new(http: Arc<dyn HttpClient>, surface: Arc<dyn InteractionSurface>) -> Self {
        Self {
            http,
            surface,
            store: None,
            settings: RwLock::new(None),
            cache: RwLock::new(TokenCache::default()),
        }
    }

    /// Persist the token cache to a file between runs
    pub fn with_store(mut self, store: TokenCacheStore) -> Self {
        self.store = Some(store);
        self
    }

    async fn settings(&self) -> Result<ClientSettings, AuthError> {
        self.settings
            .read()
            .await
            .clone()
            .ok_or(AuthError::NotInitialized)
    }

    /// Requested scopes plus the protocol scopes, deduplicated
    fn request_scopes(scopes: &[String]) -> String {
        let mut all: Vec<&str> = scopes.iter().map(String::as_str).collect();
        for scope in PROTOCOL_SCOPES {
            if !all.iter().any(|s| s.eq_ignore_ascii_case(scope)) {
                all.push(scope);
            }
        }
        all.join(" ")
    }

    /// Run one authorization code round trip through the surface
    async fn authorize_interactive(
        &self,
        scopes: &[String],
        kind: InteractionKind,
        login_hint: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<InteractiveGrant, AuthError> {
        let settings = self.settings().await?;
        let pkce = PkcePair::generate();
        let state = pkce::state_token();
        let nonce = pkce::nonce();
        let scope = Self::request_scopes(scopes);

        let mut url = settings.authorize_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &settings.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", settings.redirect_uri.as_str())
                .append_pair("response_mode", "query")
                .append_pair("scope", &scope)
                .append_pair("state", &state)
                .append_pair("nonce", &nonce)
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(hint) = login_hint {
                query.append_pair("login_hint", hint);
            }
            if let Some(prompt) = prompt {
                query.append_pair("prompt", prompt);
            }
        }

        debug!(kind = ?kind, scope = %scope, "Starting interactive authorization");
        let response = self
            .surface
            .authorize(AuthorizationRequest {
                url,
                state: state.clone(),
                kind,
            })
            .await?;

        if response.state != state {
            error!(kind = ?kind, "Authorization response state does not match the request");
            return Err(AuthError::StateMismatch);
        }

        let code = match response.outcome {
            AuthorizationOutcome::Code(code) => code,
            AuthorizationOutcome::Error { error, .. } if error == "access_denied" => {
                info!(kind = ?kind, "User declined or abandoned authorization");
                return Err(AuthError::Cancelled);
            }
            AuthorizationOutcome::Error { error, description } => {
                warn!(kind = ?kind, error = %error, "Identity provider rejected authorization");
                return Err(AuthError::Rejected { error, description });
            }
        };

        let response = self
            .token_request(
                &settings,
                &[
                    ("grant_type", "authorization_code"),
                    ("client_id", &settings.client_id),
                    ("code", &code),
                    ("redirect_uri", settings.redirect_uri.as_str()),
                    ("code_verifier", &pkce.verifier),
                    ("scope", &scope),
                ],
            )
            .await?;

        let claims = match &response.id_token {
            Some(id_token) => {
                let claims = IdTokenClaims::decode(id_token)?;
                if claims.nonce.as_deref() != Some(nonce.as_str()) {
                    error!(kind = ?kind, "ID token nonce does not match the request");
                    return Err(AuthError::invalid_response("id token nonce mismatch"));
                }
                Some(claims)
            }
            None => None,
        };

        Ok(InteractiveGrant { response, claims })
    }

    /// POST a form to the token endpoint
    async fn token_request(
        &self,
        settings: &ClientSettings,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, TokenEndpointError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let headers = HashMap::from([
            ("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ]);

        let response = self
            .http
            .post(&settings.token_endpoint, headers, body)
            .await
            .map_err(|e| TokenEndpointError::Transport(e.to_string()))?;

        if !response.is_success() {
            return match response.json::<OAuthErrorResponse>() {
                Ok(err) => {
                    debug!(
                        status = response.status(),
                        error = %err.error,
                        "Token endpoint returned an error"
                    );
                    Err(TokenEndpointError::Provider {
                        error: err.error,
                        description: err.error_description.unwrap_or_default(),
                    })
                }
                Err(_) => Err(TokenEndpointError::Malformed(format!(
                    "token endpoint returned status {}",
                    response.status()
                ))),
            };
        }

        response
            .json::<TokenResponse>()
            .map_err(|e| TokenEndpointError::Malformed(e.to_string()))
    }

    /// Record a grant in the cache and return the access token it carries
    async fn record_grant(
        &self,
        account: &UserAccount,
        scopes: &[String],
        response: TokenResponse,
    ) -> AccessToken {
        let granted_scopes = response
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| scopes.to_vec());
        let token = AccessToken::expiring_in(
            response.access_token,
            response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            granted_scopes,
        );

        let snapshot = {
            let mut cache = self.cache.write().await;
            cache.upsert_account(account.clone());
            if let Some(refresh_token) = response.refresh_token {
                cache.set_refresh_token(&account.home_account_id, refresh_token);
            }
            if !crate::auth::storage::scope_key(scopes).is_empty() {
                cache.store_access_token(&account.home_account_id, scopes, token.clone());
            }
            cache.clone()
        };
        self.persist(&snapshot).await;

        token
    }

    async fn persist(&self, cache: &TokenCache) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(cache).await {
                warn!(error = %e, "Failed to persist token cache");
            }
        }
    }

    async fn clear_cache(&self) {
        self.cache.write().await.clear();
        if let Some(store) = &self.store {
            if let Err(e) = store.clear().await {
                warn!(error = %e, "Failed to remove persisted token cache");
            }
        }
    }
}

#[async_trait]
impl IdentityClient for OidcPublicClient {
    async fn initialize(&self, config: &IdentityConfig) -> Result<(), AuthError> {
        let settings = ClientSettings::from_config(config)?;

        {
            let mut current = self.settings.write().await;
            if current.as_ref() == Some(&settings) {
                debug!("Identity client already initialized");
                return Ok(());
            }
            *current = Some(settings);
        }

        if let Some(store) = &self.store {
            match store.load().await {
                Ok(Some(cache)) => {
                    info!(
                        accounts = cache.accounts().len(),
                        "Restored token cache from disk"
                    );
                    *self.cache.write().await = cache;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable token cache");
                }
            }
        }

        info!(authority = %config.authority, "Identity client initialized");
        Ok(())
    }

    async fn cached_accounts(&self) -> Vec<UserAccount> {
        self.cache.read().await.accounts().to_vec()
    }

    async fn sign_in_interactive(&self, scopes: &[String]) -> Result<SignInResult, AuthError> {
        let grant = self
            .authorize_interactive(scopes, InteractionKind::SignIn, None, Some("select_account"))
            .await?;

        let id_token = grant
            .response
            .id_token
            .clone()
            .ok_or_else(|| AuthError::invalid_response("sign-in response has no id token"))?;
        let account = grant
            .claims
            .as_ref()
            .ok_or_else(|| AuthError::invalid_response("sign-in response has no id token"))?
            .to_account()?;

        self.record_grant(&account, scopes, grant.response).await;
        info!(account = %account.username, "Interactive sign-in completed");

        Ok(SignInResult { account, id_token })
    }

    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        account: &UserAccount,
    ) -> Result<AccessToken, SilentAuthError> {
        let settings = self
            .settings()
            .await
            .map_err(SilentAuthError::interaction_required)?;

        let refresh_token = {
            let cache = self.cache.read().await;
            if let Some(token) = cache.access_token(&account.home_account_id, scopes) {
                if !token.expires_within(EXPIRY_SKEW_SECS) {
                    debug!(account = %account.username, "Using cached access token");
                    return Ok(token.clone());
                }
            }
            cache
                .refresh_token(&account.home_account_id)
                .map(str::to_string)
        };

        let Some(refresh_token) = refresh_token else {
            return Err(SilentAuthError::interaction_required(
                "no refresh token for account",
            ));
        };

        debug!(account = %account.username, "Redeeming refresh token");
        let scope = Self::request_scopes(scopes);
        let result = self
            .token_request(
                &settings,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", &settings.client_id),
                    ("refresh_token", &refresh_token),
                    ("scope", &scope),
                ],
            )
            .await;

        match result {
            Ok(response) => Ok(self.record_grant(account, scopes, response).await),
            Err(e) => {
                let err = SilentAuthError::from(e);
                if matches!(err, SilentAuthError::InteractionRequired { .. }) {
                    // The refresh token is dead; forget it so the next attempt prompts
                    let snapshot = {
                        let mut cache = self.cache.write().await;
                        cache.remove_refresh_token(&account.home_account_id);
                        cache.remove_access_token(&account.home_account_id, scopes);
                        cache.clone()
                    };
                    self.persist(&snapshot).await;
                }
                warn!(account = %account.username, error = %err, "Silent token acquisition failed");
                Err(err)
            }
        }
    }

    async fn acquire_token_interactive(
        &self,
        scopes: &[String],
        account: &UserAccount,
    ) -> Result<AccessToken, AuthError> {
        let grant = self
            .authorize_interactive(
                scopes,
                InteractionKind::ResourceToken,
                Some(&account.username),
                None,
            )
            .await?;

        let granted_account = match &grant.claims {
            Some(claims) => claims.to_account()?,
            None => account.clone(),
        };
        if granted_account.home_account_id != account.home_account_id {
            warn!(
                expected = %account.username,
                actual = %granted_account.username,
                "Interactive token was issued to a different account"
            );
            return Err(AuthError::invalid_response(
                "token was issued to a different account",
            ));
        }

        let token = self.record_grant(&granted_account, scopes, grant.response).await;
        info!(account = %account.username, "Interactive token acquisition completed");
        Ok(token)
    }

    async fn sign_out_interactive(&self) -> Result<(), AuthError> {
        self.clear_cache().await;

        let Some(settings) = self.settings.read().await.clone() else {
            debug!("Sign-out before initialization, nothing to end");
            return Ok(());
        };

        let mut url = settings.logout_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("post_logout_redirect_uri", settings.redirect_uri.as_str());

        info!("Ending identity provider session");
        self.surface.end_session(url).await
    }
}
