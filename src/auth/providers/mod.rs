use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::token::{AccessToken, UserAccount};
use crate::config::IdentityConfig;
use crate::error::{AuthError, SilentAuthError};

pub mod oidc;

pub use oidc::OidcPublicClient;

/// What an interactive prompt is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Identity sign-in
    SignIn,
    /// Consent or re-authentication for the resource token
    ResourceToken,
    /// Provider-side sign-out
    SignOut,
}

/// Authorization request handed to the interaction surface
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Fully built authorize URL the user must visit
    pub url: Url,
    /// Opaque value the redirect must echo back
    pub state: String,
    pub kind: InteractionKind,
}

/// Result carried by the redirect back to the portal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// Authorization code to redeem at the token endpoint
    Code(String),
    /// Provider-reported failure
    Error { error: String, description: String },
}

/// Parameters of the redirect that completed an interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub state: String,
    pub outcome: AuthorizationOutcome,
}

/// Successful interactive sign-in
#[derive(Debug, Clone)]
pub struct SignInResult {
    /// The signed-in principal
    pub account: UserAccount,
    /// Raw ID token as returned by the provider
    pub id_token: String,
}

/// User-facing surface that can show the provider's pages.
///
/// `authorize` resolves once the provider redirects back, or rejects when the
/// user abandons the prompt.
#[async_trait]
pub trait InteractionSurface: Send + Sync {
    /// Present an authorize URL and wait for the redirect
    async fn authorize(&self, request: AuthorizationRequest)
        -> Result<AuthorizationResponse, AuthError>;

    /// Present the provider's end-session URL
    async fn end_session(&self, url: Url) -> Result<(), AuthError>;
}

/// Client of the OAuth2/OIDC identity provider
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Prepare the client for the given identity settings. Calling again
    /// with the same settings is harmless.
    async fn initialize(&self, config: &IdentityConfig) -> Result<(), AuthError>;

    /// Accounts remembered from earlier sign-ins, oldest first
    async fn cached_accounts(&self) -> Vec<UserAccount>;

    /// Prompt the user to sign in with the given scopes
    async fn sign_in_interactive(&self, scopes: &[String]) -> Result<SignInResult, AuthError>;

    /// Acquire a token for the scopes without showing anything to the user
    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        account: &UserAccount,
    ) -> Result<AccessToken, SilentAuthError>;

    /// Acquire a token for the scopes, prompting the user
    async fn acquire_token_interactive(
        &self,
        scopes: &[String],
        account: &UserAccount,
    ) -> Result<AccessToken, AuthError>;

    /// End the provider session and forget every cached account
    async fn sign_out_interactive(&self) -> Result<(), AuthError>;
}
