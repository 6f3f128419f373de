use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::token::UserAccount;

/// Where the controller is in the sign-in handshake
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    /// No signed-in account
    #[default]
    Unauthenticated,
    /// Identity sign-in in progress
    Authenticating,
    /// Signed in, no resource token yet
    Authenticated,
    /// Resource token acquisition in progress
    AcquiringDownstreamToken,
    /// Signed in with a resource token installed
    Ready,
    /// Signed in but the resource token could not be obtained
    Error { reason: String },
}

impl SessionState {
    /// Name used in logs and transition errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::AcquiringDownstreamToken => "acquiring_downstream_token",
            Self::Ready => "ready",
            Self::Error { .. } => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The signed-in user's session.
///
/// Being authenticated is the same thing as holding an account, so the two
/// can never disagree. The resource flag can only be raised while signed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    account: Option<UserAccount>,
    downstream_ready: bool,
}

impl Session {
    pub fn authenticated(&self) -> bool {
        self.account.is_some()
    }

    pub fn account(&self) -> Option<&UserAccount> {
        self.account.as_ref()
    }

    pub fn downstream_ready(&self) -> bool {
        self.downstream_ready
    }

    pub(crate) fn sign_in(&mut self, account: UserAccount) {
        self.account = Some(account);
        self.downstream_ready = false;
    }

    pub(crate) fn set_downstream_ready(&mut self, ready: bool) {
        self.downstream_ready = ready && self.authenticated();
    }

    pub(crate) fn reset(&mut self) {
        self.account = None;
        self.downstream_ready = false;
    }
}

/// Serializable view of the session for the view layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub authenticated: bool,
    pub account: Option<UserAccount>,
    /// Account name for display, `None` when signed out
    pub display_name: Option<String>,
    pub downstream_ready: bool,
}

impl SessionSnapshot {
    pub(crate) fn new(state: SessionState, session: &Session, token_live: bool) -> Self {
        Self {
            state,
            authenticated: session.authenticated(),
            account: session.account().cloned(),
            display_name: session.account().map(|a| a.display_name().to_string()),
            downstream_ready: session.downstream_ready() && token_live,
        }
    }
}
