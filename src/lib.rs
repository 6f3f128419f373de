use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod http_client;
pub mod records;

pub use config::Configuration;
pub use error::{PortalError, PortalResult};

use crate::auth::providers::{IdentityClient, InteractionKind};
use crate::auth::{
    AuthSessionController, BrowserRedirectSurface, OidcPublicClient, SessionSnapshot,
    TokenCacheStore,
};
use crate::events::{auth_event_stream, AuthEvent, EventStream};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::records::RecordApiClient;

/// Application context shared by every request handler
pub struct PortalContext {
    /// Configuration snapshot loaded at startup
    pub config: Configuration,
    /// Browser surface completing interactive authorizations
    pub surface: Arc<BrowserRedirectSurface>,
    /// Dynamics Web API client
    pub records: Arc<RecordApiClient>,
    /// Session state machine
    pub controller: Arc<AuthSessionController>,
    /// Session lifecycle events
    pub events: EventStream<AuthEvent>,
}

impl PortalContext {
    /// Build the context with a real HTTP client
    pub fn new(config: Configuration) -> Result<Self> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
        Ok(Self::with_http(config, http))
    }

    /// Build the context around an existing HTTP client
    pub fn with_http(config: Configuration, http: Arc<dyn HttpClient>) -> Self {
        let events = auth_event_stream();

        let surface = Arc::new(
            BrowserRedirectSurface::new(config.server.interaction_timeout)
                .with_events(events.clone()),
        );

        let mut identity = OidcPublicClient::new(Arc::clone(&http), surface.clone());
        if let Some(path) = &config.server.token_cache_path {
            debug!(path = %path.display(), "Token cache persistence enabled");
            identity = identity.with_store(TokenCacheStore::new(path.clone()));
        }
        let identity: Arc<dyn IdentityClient> = Arc::new(identity);

        let records = Arc::new(RecordApiClient::new(http));
        let controller = Arc::new(AuthSessionController::new(
            Arc::clone(&identity),
            Arc::clone(&records),
            &config,
            events.clone(),
        ));

        Self {
            config,
            surface,
            records,
            controller,
            events,
        }
    }

    /// Sign out and abandon any prompt still waiting for the user.
    ///
    /// Returns the provider's end-session URL when there is one to visit.
    pub async fn sign_out(&self) -> PortalResult<(SessionSnapshot, Option<String>)> {
        let result = self.controller.sign_out().await;
        let end_session_url = self
            .surface
            .take_prompt(InteractionKind::SignOut)
            .map(|prompt| prompt.url);
        self.surface.cancel_all();

        result.map(|snapshot| (snapshot, end_session_url))
    }
}

/// Run the portal until interrupted
pub async fn run(config: Configuration) -> Result<()> {
    let ctx = Arc::new(PortalContext::new(config)?);

    info!("Restoring any cached session");
    tokio::spawn({
        let controller = Arc::clone(&ctx.controller);
        async move {
            match controller.restore().await {
                Ok(snapshot) => info!(state = %snapshot.state, "Session restore finished"),
                Err(PortalError::Auth(e)) => warn!(error = %e, "Session restore did not complete"),
                Err(e) => error!(error = %e, "Session restore failed"),
            }
        }
    });

    api::serve(ctx).await
}
