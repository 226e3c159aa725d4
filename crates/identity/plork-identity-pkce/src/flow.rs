//! The login state machine.
//!
//! `Idle -> AttemptPending -> Redeeming -> Authenticated | Failed`, with
//! `AttemptPending -> Failed` on a state mismatch and any state back to `Idle`
//! on logout.

use crate::client::{OAuth2Client, PkceChallenge};
use crate::config::PkceClientConfig;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::session::{Session, SessionStore};
use crate::state::{AttemptStore, AuthorizationAttempt};
use crate::types::{AuthorizationResponse, IdentityProfile, TokenResponse};
use plork_identity_core::{NoopPermissions, UserPermissions};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AttemptPending,
    Redeeming,
    Authenticated(Session),
    Failed { reason: String },
}

/// Result of inspecting a URL that may be an OAuth2 redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The URL carries neither `code` nor `error`
    NotACallback,
    Authenticated(Session),
}

/// Drives one browsing context through the PKCE login.
///
/// The attempt store must be scoped to the context (it only needs to survive
/// the redirect); the session store is durable.
pub struct PkceFlowManager {
    config: PkceClientConfig,
    client: OAuth2Client,
    attempts: Arc<dyn AttemptStore>,
    sessions: Arc<dyn SessionStore>,
    permissions: Arc<dyn UserPermissions>,
    state_tx: watch::Sender<FlowState>,
}

impl PkceFlowManager {
    pub fn new(
        config: PkceClientConfig,
        attempts: Arc<dyn AttemptStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> OAuth2Result<Self> {
        config.validate()?;
        let client = OAuth2Client::new(config.http_timeout_seconds)?;
        let (state_tx, _) = watch::channel(FlowState::Idle);

        Ok(Self {
            config,
            client,
            attempts,
            sessions,
            permissions: Arc::new(NoopPermissions),
            state_tx,
        })
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn UserPermissions>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Receive every state transition, starting from the current state
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> FlowState {
        self.state_tx.borrow().clone()
    }

    fn transition(&self, next: FlowState) {
        debug!("Login flow state -> {}", discriminant_name(&next));
        self.state_tx.send_replace(next);
    }

    fn fail(&self, error: OAuth2Error) -> OAuth2Error {
        warn!("Login attempt failed: {}", error);
        self.transition(FlowState::Failed {
            reason: error.user_message().to_string(),
        });
        error
    }

    /// Start a login and return the URL the user must be sent to.
    ///
    /// Replaces any pending attempt, so only the most recent URL can complete.
    pub async fn begin_login(&self) -> OAuth2Result<Url> {
        let pkce = PkceChallenge::new();
        let attempt = AuthorizationAttempt::new(&pkce);
        let url = self
            .client
            .authorization_url(&self.config, &pkce, &attempt.state)?;

        self.attempts.store(attempt).await?;
        self.transition(FlowState::AttemptPending);

        info!("Started login for provider: {}", self.config.provider_id);
        Ok(url)
    }

    /// Complete a login from the URL the provider redirected to.
    pub async fn handle_callback(&self, current_url: &str) -> OAuth2Result<CallbackOutcome> {
        let url = Url::parse(current_url)?;
        let response = AuthorizationResponse::from_url(&url);

        let Some(code) = response.code.as_deref() else {
            if let Some(summary) = response.error_summary() {
                self.attempts.clear().await?;
                return Err(self.fail(OAuth2Error::AuthorizationDenied(summary)));
            }
            return Ok(CallbackOutcome::NotACallback);
        };

        // Consumed before comparing so a rejected callback cannot be replayed
        let attempt = self.attempts.take().await?;
        let attempt = match (attempt, response.state.as_deref()) {
            (Some(attempt), Some(state)) if attempt.matches(state) => attempt,
            (None, _) => {
                warn!("Callback received without a pending login attempt");
                return Err(self.fail(OAuth2Error::StateMismatch));
            }
            _ => return Err(self.fail(OAuth2Error::StateMismatch)),
        };

        self.transition(FlowState::Redeeming);

        let token = match self.exchange_code(code, &attempt.code_verifier).await {
            Ok(token) => token,
            Err(e) => return Err(self.fail(e)),
        };

        let profile = match self.fetch_profile(&token.access_token).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Logged in without a profile: {}", e);
                None
            }
        };

        let session = Session::new(token, profile);
        if let Err(e) = self.sessions.save(&session).await {
            return Err(self.fail(e));
        }

        self.transition(FlowState::Authenticated(session.clone()));
        info!("Login completed for provider: {}", self.config.provider_id);
        Ok(CallbackOutcome::Authenticated(session))
    }

    pub async fn exchange_code(&self, code: &str, verifier: &str) -> OAuth2Result<TokenResponse> {
        self.client.exchange_code(&self.config, code, verifier).await
    }

    pub async fn fetch_profile(&self, access_token: &str) -> OAuth2Result<IdentityProfile> {
        self.client.fetch_profile(&self.config, access_token).await
    }

    /// Load a previously established session. Makes no network request, so an
    /// expired token is only noticed when it is next used.
    pub async fn restore_session(&self) -> OAuth2Result<Option<Session>> {
        let session = self.sessions.load().await?;

        match &session {
            Some(session) => {
                debug!("Restored stored session");
                self.transition(FlowState::Authenticated(session.clone()));
            }
            None => self.transition(FlowState::Idle),
        }

        Ok(session)
    }

    /// Forget the session and any pending attempt. Safe to call repeatedly.
    pub async fn logout(&self) -> OAuth2Result<()> {
        self.sessions.clear().await?;
        self.attempts.clear().await?;
        self.transition(FlowState::Idle);
        info!("Logged out");
        Ok(())
    }

    /// Permissions granted to the session's user; empty without a profile.
    pub async fn permissions(&self, session: &Session) -> OAuth2Result<Vec<String>> {
        match session.identity(&self.config.provider_id) {
            Some(identity) => Ok(self.permissions.get_permissions(&identity?).await?),
            None => Ok(Vec::new()),
        }
    }

    pub fn avatar_url(&self, profile: &IdentityProfile) -> Option<String> {
        profile.avatar_url(&self.config.avatar_cdn)
    }
}

fn discriminant_name(state: &FlowState) -> &'static str {
    match state {
        FlowState::Idle => "Idle",
        FlowState::AttemptPending => "AttemptPending",
        FlowState::Redeeming => "Redeeming",
        FlowState::Authenticated(_) => "Authenticated",
        FlowState::Failed { .. } => "Failed",
    }
}
