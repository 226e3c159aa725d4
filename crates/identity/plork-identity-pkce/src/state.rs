//! Pending authorization attempt storage for CSRF protection.
//!
//! A context holds at most one pending attempt. Starting a new login replaces
//! it, and redeeming a callback removes it whether or not the callback is valid.

use crate::client::{PkceChallenge, generate_state};
use crate::error::OAuth2Result;
use crate::storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

const ATTEMPT_FILE: &str = "attempt.json";

/// State and verifier remembered across the redirect round trip
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationAttempt {
    pub state: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationAttempt {
    pub fn new(pkce: &PkceChallenge) -> Self {
        Self {
            state: generate_state(),
            code_verifier: pkce.code_verifier.clone(),
            created_at: Utc::now(),
        }
    }

    /// Exact comparison against the `state` echoed by the provider
    pub fn matches(&self, returned_state: &str) -> bool {
        self.state == returned_state
    }
}

impl std::fmt::Debug for AuthorizationAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationAttempt")
            .field("state", &self.state)
            .field("code_verifier", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Ephemeral storage for the single pending attempt
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Store the attempt, replacing any pending one
    async fn store(&self, attempt: AuthorizationAttempt) -> OAuth2Result<()>;

    /// Remove and return the pending attempt
    async fn take(&self) -> OAuth2Result<Option<AuthorizationAttempt>>;

    /// Look at the pending attempt without consuming it
    async fn pending(&self) -> OAuth2Result<Option<AuthorizationAttempt>>;

    async fn clear(&self) -> OAuth2Result<()>;
}

/// In-memory implementation of AttemptStore
#[derive(Clone, Default)]
pub struct InMemoryAttemptStore {
    attempt: Arc<RwLock<Option<AuthorizationAttempt>>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn store(&self, attempt: AuthorizationAttempt) -> OAuth2Result<()> {
        *self.attempt.write().await = Some(attempt);
        Ok(())
    }

    async fn take(&self) -> OAuth2Result<Option<AuthorizationAttempt>> {
        Ok(self.attempt.write().await.take())
    }

    async fn pending(&self) -> OAuth2Result<Option<AuthorizationAttempt>> {
        Ok(self.attempt.read().await.clone())
    }

    async fn clear(&self) -> OAuth2Result<()> {
        self.attempt.write().await.take();
        Ok(())
    }
}

/// Keeps the pending attempt in `attempt.json` inside a per-context directory,
/// so it survives the process exiting between `login` and `callback`.
pub struct FileAttemptStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileAttemptStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(ATTEMPT_FILE),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AttemptStore for FileAttemptStore {
    async fn store(&self, attempt: AuthorizationAttempt) -> OAuth2Result<()> {
        let _guard = self.lock.write().await;
        storage::write_json(&self.path, &attempt).await
    }

    async fn take(&self) -> OAuth2Result<Option<AuthorizationAttempt>> {
        let _guard = self.lock.write().await;
        let attempt = storage::read_json(&self.path).await;
        // Consume even when the record is unreadable
        storage::remove(&self.path).await?;
        attempt
    }

    async fn pending(&self) -> OAuth2Result<Option<AuthorizationAttempt>> {
        let _guard = self.lock.read().await;
        storage::read_json(&self.path).await
    }

    async fn clear(&self) -> OAuth2Result<()> {
        let _guard = self.lock.write().await;
        if storage::remove(&self.path).await? {
            debug!("Removed pending login attempt at {}", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_attempt_store() {
        let store = InMemoryAttemptStore::new();
        let attempt = AuthorizationAttempt::new(&PkceChallenge::new());

        store.store(attempt.clone()).await.unwrap();
        assert_eq!(store.pending().await.unwrap(), Some(attempt.clone()));

        let taken = store.take().await.unwrap();
        assert_eq!(taken, Some(attempt));

        // Single use
        assert!(store.take().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_attempt_replaces_pending() {
        let store = InMemoryAttemptStore::new();
        let first = AuthorizationAttempt::new(&PkceChallenge::new());
        let second = AuthorizationAttempt::new(&PkceChallenge::new());

        store.store(first.clone()).await.unwrap();
        store.store(second.clone()).await.unwrap();

        let taken = store.take().await.unwrap().unwrap();
        assert!(taken.matches(&second.state));
        assert!(!taken.matches(&first.state));
    }

    #[tokio::test]
    async fn test_file_attempt_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let attempt = AuthorizationAttempt::new(&PkceChallenge::new());

        FileAttemptStore::new(dir.path())
            .store(attempt.clone())
            .await
            .unwrap();

        // A fresh handle sees the attempt, as after a process restart
        let store = FileAttemptStore::new(dir.path());
        assert!(store.path().exists());
        assert_eq!(store.take().await.unwrap(), Some(attempt));
        assert!(!store.path().exists());
        assert!(store.take().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_attempt_store_consumes_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAttemptStore::new(dir.path());
        tokio::fs::write(store.path(), b"not json").await.unwrap();

        assert!(store.take().await.is_err());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_file_attempt_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAttemptStore::new(dir.path());

        store.clear().await.unwrap();
        store
            .store(AuthorizationAttempt::new(&PkceChallenge::new()))
            .await
            .unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.pending().await.unwrap().is_none());
    }
}
