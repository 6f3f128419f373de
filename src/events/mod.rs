use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::providers::InteractionKind;
use crate::auth::session::SessionState;
use crate::auth::token::UserAccount;

pub mod streams;
pub use streams::{EventStream, EventStreamStats, Subscriber};

// Auth event stream sizing
pub const AUTH_EVENT_CAPACITY: usize = 100;
pub const AUTH_EVENT_BUFFER_SIZE: usize = 50;

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    /// The controller moved between states
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// The user must visit a provider page to continue
    InteractionRequired { kind: InteractionKind, url: String },
    /// Identity sign-in finished
    SignedIn { account: UserAccount },
    /// A resource token was installed
    DownstreamReady {
        expires_on: Option<DateTime<Utc>>,
    },
    /// Resource token acquisition failed after the interactive fallback
    DownstreamFailed { reason: String },
    SignedOut,
}

/// Create the stream shared by the controller and the interaction surface
pub fn auth_event_stream() -> EventStream<AuthEvent> {
    EventStream::new(AUTH_EVENT_CAPACITY, AUTH_EVENT_BUFFER_SIZE)
}
