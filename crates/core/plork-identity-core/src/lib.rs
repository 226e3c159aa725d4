//! Core identity types and permission traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Missing required profile field: {0}")]
    MissingField(&'static str),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// An identity confirmed by an external provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub provider_id: String,
    pub subject: String,
    pub display_name: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl VerifiedIdentity {
    /// Builds an identity, rejecting blank subjects.
    pub fn new(
        provider_id: impl Into<String>,
        subject: impl Into<String>,
        display_name: Option<String>,
    ) -> IdentityResult<Self> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(IdentityError::MissingField("subject"));
        }

        Ok(Self {
            provider_id: provider_id.into(),
            subject,
            display_name,
            metadata: None,
        })
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[async_trait]
pub trait UserPermissions: Send + Sync {
    async fn get_permissions(&self, identity: &VerifiedIdentity) -> IdentityResult<Vec<String>>;
}

/// A default implementation that returns no permissions
pub struct NoopPermissions;

#[async_trait]
impl UserPermissions for NoopPermissions {
    async fn get_permissions(&self, _identity: &VerifiedIdentity) -> IdentityResult<Vec<String>> {
        Ok(Vec::new())
    }
}

pub const ADMIN_PERMISSION: &str = "admin";

/// Grants [`ADMIN_PERMISSION`] to a fixed set of provider subjects.
///
/// This mirrors the storefront's client-side admin switch. It only decides
/// what the local interface shows: anyone controlling the client can bypass
/// it, so every privileged operation must still be authorized by the backend.
#[derive(Debug, Clone, Default)]
pub struct AllowListPermissions {
    subjects: HashSet<String>,
}

impl AllowListPermissions {
    pub fn new<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_listed(&self, subject: &str) -> bool {
        self.subjects.contains(subject)
    }
}

#[async_trait]
impl UserPermissions for AllowListPermissions {
    async fn get_permissions(&self, identity: &VerifiedIdentity) -> IdentityResult<Vec<String>> {
        if self.is_listed(&identity.subject) {
            Ok(vec![ADMIN_PERMISSION.to_string()])
        } else {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(subject: &str) -> VerifiedIdentity {
        VerifiedIdentity::new("discord", subject, Some("alice".to_string())).unwrap()
    }

    #[test]
    fn test_blank_subject_rejected() {
        let result = VerifiedIdentity::new("discord", "  ", None);
        assert!(matches!(result, Err(IdentityError::MissingField("subject"))));
    }

    #[tokio::test]
    async fn test_allow_list_grants_admin() {
        let permissions = AllowListPermissions::new(["715175664193372171"]);

        let granted = permissions
            .get_permissions(&identity("715175664193372171"))
            .await
            .unwrap();
        assert_eq!(granted, vec![ADMIN_PERMISSION.to_string()]);

        let denied = permissions.get_permissions(&identity("42")).await.unwrap();
        assert!(denied.is_empty());
    }

    #[tokio::test]
    async fn test_noop_permissions() {
        let granted = NoopPermissions
            .get_permissions(&identity("715175664193372171"))
            .await
            .unwrap();
        assert!(granted.is_empty());
    }
}
