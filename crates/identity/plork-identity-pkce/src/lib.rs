//! Discord login for the Plork storefront using the OAuth2 authorization-code flow with PKCE.
//!
//! The flow runs without a client secret. [`PkceFlowManager::begin_login`] produces the
//! authorization URL and remembers the `state`/`code_verifier` pair in an ephemeral
//! [`AttemptStore`]; [`PkceFlowManager::handle_callback`] checks the returned `state`,
//! redeems the authorization code exactly once and persists the resulting [`Session`]
//! in a durable [`SessionStore`].

mod client;
mod config;
mod error;
mod flow;
mod session;
mod state;
mod storage;
mod types;


pub use client::{OAuth2Client, PkceChallenge, generate_state};
pub use config::{DISCORD_AVATAR_CDN, PkceClientConfig};
pub use error::{OAuth2Error, OAuth2Result};
pub use flow::{CallbackOutcome, FlowState, PkceFlowManager};
pub use session::{FileSessionStore, InMemorySessionStore, Session, SessionStore};
pub use state::{AttemptStore, AuthorizationAttempt, FileAttemptStore, InMemoryAttemptStore};
pub use types::{AuthorizationResponse, IdentityProfile, TokenResponse};

// Re-export common types for convenience
pub use plork_identity_core::{AllowListPermissions, UserPermissions, VerifiedIdentity};
