//! Durable session records.

use crate::error::OAuth2Result;
use crate::storage;
use crate::types::{IdentityProfile, TokenResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plork_identity_core::{IdentityResult, VerifiedIdentity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

const SESSION_FILE: &str = "session.json";

/// An established login.
///
/// `profile` is `None` when the token exchange succeeded but the profile could
/// not be fetched; the session is still valid for API calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: TokenResponse,
    pub profile: Option<IdentityProfile>,
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: TokenResponse, profile: Option<IdentityProfile>) -> Self {
        Self {
            token,
            profile,
            established_at: Utc::now(),
        }
    }

    pub fn identity(&self, provider_id: &str) -> Option<IdentityResult<VerifiedIdentity>> {
        self.profile
            .as_ref()
            .map(|profile| profile.to_identity(provider_id))
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> OAuth2Result<Option<Session>>;

    async fn save(&self, session: &Session) -> OAuth2Result<()>;

    /// Remove the stored session; succeeds when there is none
    async fn clear(&self) -> OAuth2Result<()>;
}

/// In-memory implementation of SessionStore
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    session: Arc<RwLock<Option<Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self) -> OAuth2Result<Option<Session>> {
        Ok(self.session.read().await.clone())
    }

    async fn save(&self, session: &Session) -> OAuth2Result<()> {
        *self.session.write().await = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> OAuth2Result<()> {
        self.session.write().await.take();
        Ok(())
    }
}

/// Stores the session as `session.json` in the given directory
pub struct FileSessionStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> OAuth2Result<Option<Session>> {
        let _guard = self.lock.read().await;
        storage::read_json(&self.path).await
    }

    async fn save(&self, session: &Session) -> OAuth2Result<()> {
        let _guard = self.lock.write().await;
        storage::write_json(&self.path, session).await
    }

    async fn clear(&self) -> OAuth2Result<()> {
        let _guard = self.lock.write().await;
        if storage::remove(&self.path).await? {
            debug!("Removed stored session at {}", self.path.display());
        }
        Ok(())
    }
}
