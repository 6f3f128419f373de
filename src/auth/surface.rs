use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::providers::{
    AuthorizationOutcome, AuthorizationRequest, AuthorizationResponse, InteractionKind,
    InteractionSurface,
};
use crate::error::AuthError;
use crate::events::{AuthEvent, EventStream};

/// A provider page the user currently has to visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionPrompt {
    pub kind: InteractionKind,
    pub url: String,
    #[serde(skip)]
    state: Option<String>,
}

/// Interaction surface backed by the user's browser.
///
/// `authorize` publishes the provider URL as a prompt and parks until the
/// provider redirects back to the portal, which hands the redirect to
/// [`BrowserRedirectSurface::complete`].
pub struct BrowserRedirectSurface {
    /// Waiters keyed by the `state` they expect back
    pending: DashMap<String, oneshot::Sender<AuthorizationResponse>>,
    prompt: watch::Sender<Option<InteractionPrompt>>,
    timeout: Duration,
    events: Option<EventStream<AuthEvent>>,
}

/// Removes a pending authorization however the wait ends
struct PendingGuard<'a> {
    surface: &'a BrowserRedirectSurface,
    state: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.surface.pending.remove(&self.state);
        self.surface.clear_prompt_for(&self.state);
    }
}

impl BrowserRedirectSurface {
    pub fn new(timeout: Duration) -> Self {
        let (prompt, _) = watch::channel(None);
        Self {
            pending: DashMap::new(),
            prompt,
            timeout,
            events: None,
        }
    }

    /// Also announce prompts on the auth event stream
    pub fn with_events(mut self, events: EventStream<AuthEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Watch the prompt the user should be sent to
    pub fn subscribe_prompts(&self) -> watch::Receiver<Option<InteractionPrompt>> {
        self.prompt.subscribe()
    }

    pub fn current_prompt(&self) -> Option<InteractionPrompt> {
        self.prompt.borrow().clone()
    }

    /// Take the current prompt if it is of the given kind
    pub fn take_prompt(&self, kind: InteractionKind) -> Option<InteractionPrompt> {
        let mut taken = None;
        self.prompt.send_if_modified(|prompt| {
            if prompt.as_ref().is_some_and(|p| p.kind == kind) {
                taken = prompt.take();
                true
            } else {
                false
            }
        });
        taken
    }

    /// Number of authorizations waiting for a redirect
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Deliver a redirect to the authorization waiting for its state
    pub fn complete(&self, response: AuthorizationResponse) -> Result<(), AuthError> {
        let Some((state, waiter)) = self.pending.remove(&response.state) else {
            warn!("Redirect received for an unknown or expired authorization");
            return Err(AuthError::StateMismatch);
        };

        debug!("Delivering authorization redirect");
        if waiter.send(response).is_err() {
            // The waiter gave up between lookup and delivery
            debug!(state = %state, "Authorization waiter already gone");
            return Err(AuthError::Cancelled);
        }
        Ok(())
    }

    /// Abandon every pending authorization
    pub fn cancel_all(&self) {
        let count = self.pending.len();
        self.pending.clear();
        self.prompt.send_replace(None);
        if count > 0 {
            info!(count, "Cancelled pending authorizations");
        }
    }

    fn clear_prompt_for(&self, state: &str) {
        self.prompt.send_if_modified(|prompt| {
            if prompt.as_ref().and_then(|p| p.state.as_deref()) == Some(state) {
                *prompt = None;
                true
            } else {
                false
            }
        });
    }

    async fn announce(&self, kind: InteractionKind, url: &Url) {
        if let Some(events) = &self.events {
            events
                .publish(AuthEvent::InteractionRequired {
                    kind,
                    url: url.to_string(),
                })
                .await;
        }
    }
}

/// Parse the query parameters of a provider redirect
pub fn parse_redirect(params: &HashMap<String, String>) -> Result<AuthorizationResponse, AuthError> {
    let state = params
        .get("state")
        .cloned()
        .ok_or(AuthError::StateMismatch)?;

    let outcome = if let Some(error) = params.get("error") {
        AuthorizationOutcome::Error {
            error: error.clone(),
            description: params.get("error_description").cloned().unwrap_or_default(),
        }
    } else if let Some(code) = params.get("code") {
        AuthorizationOutcome::Code(code.clone())
    } else {
        return Err(AuthError::invalid_response(
            "redirect carries neither a code nor an error",
        ));
    };

    Ok(AuthorizationResponse { state, outcome })
}

#[async_trait]
impl InteractionSurface for BrowserRedirectSurface {
    async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorizationResponse, AuthError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request.state.clone(), tx);
        let _guard = PendingGuard {
            surface: self,
            state: request.state.clone(),
        };

        self.prompt.send_replace(Some(InteractionPrompt {
            kind: request.kind,
            url: request.url.to_string(),
            state: Some(request.state.clone()),
        }));
        self.announce(request.kind, &request.url).await;
        info!(kind = ?request.kind, "Waiting for the user to complete authorization");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                debug!(kind = ?request.kind, "Authorization abandoned");
                Err(AuthError::Cancelled)
            }
            Err(_) => {
                warn!(
                    kind = ?request.kind,
                    timeout_secs = self.timeout.as_secs(),
                    "Authorization timed out"
                );
                Err(AuthError::Cancelled)
            }
        }
    }

    async fn end_session(&self, url: Url) -> Result<(), AuthError> {
        self.prompt.send_replace(Some(InteractionPrompt {
            kind: InteractionKind::SignOut,
            url: url.to_string(),
            state: None,
        }));
        self.announce(InteractionKind::SignOut, &url).await;
        Ok(())
    }
}
