pub mod pkce;
pub mod providers;
pub mod service;
pub mod session;
pub mod storage;
pub mod surface;
pub mod token;

pub use providers::{IdentityClient, InteractionSurface, OidcPublicClient};
pub use service::AuthSessionController;
pub use session::{Session, SessionSnapshot, SessionState};
pub use storage::{TokenCache, TokenCacheStore};
pub use surface::{BrowserRedirectSurface, InteractionPrompt};
pub use token::{AccessToken, UserAccount};
