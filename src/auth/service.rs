use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::auth::providers::IdentityClient;
use crate::auth::session::{Session, SessionSnapshot, SessionState};
use crate::auth::token::{AccessToken, UserAccount};
use crate::config::{Configuration, IdentityConfig, ResourceConfig};
use crate::error::{AuthError, PortalError, PortalResult};
use crate::events::{AuthEvent, EventStream, Subscriber};
use crate::records::RecordApiClient;

/// State guarded by the controller's lock
#[derive(Debug, Default)]
struct SessionInner {
    state: SessionState,
    session: Session,
}

/// Drives the two-stage handshake: identity sign-in, then a token for the
/// record API. The only writer of the session and of the record client's token.
pub struct AuthSessionController {
    identity: Arc<dyn IdentityClient>,
    records: Arc<RecordApiClient>,
    identity_config: IdentityConfig,
    resource: ResourceConfig,
    inner: RwLock<SessionInner>,
    /// Held for the whole of an identity sign-in
    sign_in_gate: Mutex<()>,
    /// Held for the whole of a resource token acquisition
    token_gate: Mutex<()>,
    /// Bumped by sign-out; results started under an older epoch are discarded
    epoch: AtomicU64,
    events: EventStream<AuthEvent>,
}

impl AuthSessionController {
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        records: Arc<RecordApiClient>,
        config: &Configuration,
        events: EventStream<AuthEvent>,
    ) -> Self {
        Self {
            identity,
            records,
            identity_config: config.identity.clone(),
            resource: config.resource.clone(),
            inner: RwLock::new(SessionInner::default()),
            sign_in_gate: Mutex::new(()),
            token_gate: Mutex::new(()),
            epoch: AtomicU64::new(0),
            events,
        }
    }

    /// Current session, cloned
    pub async fn session(&self) -> Session {
        self.inner.read().await.session.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state.clone()
    }

    /// Serializable view of the session
    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read().await;
        let token_live = self.records.has_valid_token().await;
        SessionSnapshot::new(inner.state.clone(), &inner.session, token_live)
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> Subscriber<AuthEvent> {
        self.events.subscribe()
    }

    /// Resume a session from the identity client's cache without prompting
    /// for identity. Stays signed out when nothing is cached.
    pub async fn restore(&self) -> PortalResult<SessionSnapshot> {
        let gate = self
            .sign_in_gate
            .try_lock()
            .map_err(|_| AuthError::InProgress { operation: "sign-in" })?;

        self.identity.initialize(&self.identity_config).await?;

        let accounts = self.identity.cached_accounts().await;
        let Some(account) = accounts.first().cloned() else {
            debug!("No cached account to restore");
            return Ok(self.snapshot().await);
        };
        if accounts.len() > 1 {
            warn!(
                count = accounts.len(),
                account = %account.username,
                "Several cached accounts found, restoring the first"
            );
        }

        {
            let mut inner = self.inner.write().await;
            if inner.state != SessionState::Unauthenticated {
                debug!(state = %inner.state, "Session already active, skipping restore");
                drop(inner);
                return Ok(self.snapshot().await);
            }
            self.sign_in_account(&mut inner, account.clone()).await;
        }
        info!(account = %account.username, "Session restored from cache");

        drop(gate);
        self.acquire_downstream_token().await
    }

    /// Interactive identity sign-in followed by resource token acquisition
    pub async fn sign_in(&self) -> PortalResult<SessionSnapshot> {
        let gate = self
            .sign_in_gate
            .try_lock()
            .map_err(|_| AuthError::InProgress { operation: "sign-in" })?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        {
            let mut inner = self.inner.write().await;
            if inner.state != SessionState::Unauthenticated {
                return Err(AuthError::InvalidTransition {
                    operation: "sign in",
                    state: inner.state.to_string(),
                }
                .into());
            }
            self.transition(&mut inner, SessionState::Authenticating).await;
        }

        info!("Starting interactive sign-in");
        let result = match self.identity.initialize(&self.identity_config).await {
            Ok(()) => {
                self.identity
                    .sign_in_interactive(&self.identity_config.scopes)
                    .await
            }
            Err(e) => Err(e),
        };

        {
            let mut inner = self.inner.write().await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                info!("Sign-in finished after sign-out, discarding the result");
                return Err(AuthError::Interrupted.into());
            }

            match result {
                Ok(signed_in) => {
                    info!(account = %signed_in.account.username, "Sign-in succeeded");
                    self.sign_in_account(&mut inner, signed_in.account).await;
                }
                Err(e) => {
                    warn!(error = %e, "Sign-in failed");
                    inner.session.reset();
                    self.transition(&mut inner, SessionState::Unauthenticated)
                        .await;
                    return Err(e.into());
                }
            }
        }

        drop(gate);
        self.acquire_downstream_token().await
    }

    /// Obtain a token for the record API: silently first, then with exactly
    /// one interactive attempt. Also the retry path from the error state and
    /// the renewal path once an installed token has expired.
    pub async fn acquire_downstream_token(&self) -> PortalResult<SessionSnapshot> {
        let _gate = self.token_gate.try_lock().map_err(|_| AuthError::InProgress {
            operation: "token acquisition",
        })?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        let account = {
            let mut inner = self.inner.write().await;
            match inner.state {
                SessionState::Authenticated | SessionState::Ready | SessionState::Error { .. } => {}
                SessionState::Unauthenticated => return Err(PortalError::Unauthenticated),
                SessionState::Authenticating | SessionState::AcquiringDownstreamToken => {
                    return Err(AuthError::InvalidTransition {
                        operation: "acquire a resource token",
                        state: inner.state.to_string(),
                    }
                    .into());
                }
            }
            let account = inner
                .session
                .account()
                .cloned()
                .ok_or(PortalError::Unauthenticated)?;
            inner.session.set_downstream_ready(false);
            self.records.initialize(self.resource.clone()).await;
            self.records.clear_token().await;
            self.transition(&mut inner, SessionState::AcquiringDownstreamToken)
                .await;
            account
        };

        let result = self.acquire_with_fallback(&account).await;

        let mut inner = self.inner.write().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            info!("Token acquisition finished after sign-out, discarding the result");
            return Err(AuthError::Interrupted.into());
        }

        let installed = match result {
            Ok(token) => {
                let expires_on = token.expires_on();
                self.records
                    .set_access_token(token)
                    .await
                    .map(|()| expires_on)
                    .map_err(PortalError::from)
            }
            Err(e) => Err(e),
        };

        match installed {
            Ok(expires_on) => {
                inner.session.set_downstream_ready(true);
                self.transition(&mut inner, SessionState::Ready).await;
                self.events
                    .publish(AuthEvent::DownstreamReady { expires_on })
                    .await;
                info!(account = %account.username, ?expires_on, "Resource token installed");
                let token_live = self.records.has_valid_token().await;
                Ok(SessionSnapshot::new(
                    inner.state.clone(),
                    &inner.session,
                    token_live,
                ))
            }
            Err(e) => {
                error!(account = %account.username, error = %e, "Resource token acquisition failed");
                inner.session.set_downstream_ready(false);
                let reason = e.to_string();
                self.transition(
                    &mut inner,
                    SessionState::Error {
                        reason: reason.clone(),
                    },
                )
                .await;
                self.events
                    .publish(AuthEvent::DownstreamFailed { reason })
                    .await;
                Err(e)
            }
        }
    }

    /// Make sure a live resource token is installed, acquiring one if not
    pub async fn ensure_downstream_token(&self) -> PortalResult<SessionSnapshot> {
        let ready = {
            let inner = self.inner.read().await;
            inner.state == SessionState::Ready && inner.session.downstream_ready()
        };
        if ready && self.records.has_valid_token().await {
            return Ok(self.snapshot().await);
        }
        debug!("Resource token missing or expired, acquiring");
        self.acquire_downstream_token().await
    }

    /// Sign out from any state. Local state is always reset; a failure to
    /// end the provider session is still reported.
    pub async fn sign_out(&self) -> PortalResult<SessionSnapshot> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        info!("Signing out");

        let result = self.identity.sign_out_interactive().await;

        {
            let mut inner = self.inner.write().await;
            inner.session.reset();
            self.records.clear().await;
            self.transition(&mut inner, SessionState::Unauthenticated)
                .await;
        }
        self.events.publish(AuthEvent::SignedOut).await;

        match result {
            Ok(()) => Ok(self.snapshot().await),
            Err(e) => {
                warn!(error = %e, "Identity provider sign-out failed, local session cleared");
                Err(e.into())
            }
        }
    }

    async fn acquire_with_fallback(&self, account: &UserAccount) -> PortalResult<AccessToken> {
        let scopes = &self.resource.scopes;

        match self.identity.acquire_token_silent(scopes, account).await {
            Ok(token) => {
                debug!(account = %account.username, "Silent token acquisition succeeded");
                Ok(token)
            }
            Err(silent) => {
                info!(
                    account = %account.username,
                    reason = %silent,
                    "Silent token acquisition failed, prompting the user"
                );
                self.identity
                    .acquire_token_interactive(scopes, account)
                    .await
                    .map_err(PortalError::from)
            }
        }
    }

    async fn sign_in_account(&self, inner: &mut SessionInner, account: UserAccount) {
        inner.session.sign_in(account.clone());
        self.transition(inner, SessionState::Authenticated).await;
        self.events.publish(AuthEvent::SignedIn { account }).await;
    }

    async fn transition(&self, inner: &mut SessionInner, to: SessionState) {
        let from = std::mem::replace(&mut inner.state, to.clone());
        if from == to {
            return;
        }
        debug!(from = %from, to = %to, "Session state changed");
        self.events
            .publish(AuthEvent::StateChanged { from, to })
            .await;
    }
}
