//! OAuth2 protocol types.

use plork_identity_core::{IdentityError, IdentityResult, VerifiedIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Query parameters the provider appends to the redirect URI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl AuthorizationResponse {
    pub fn from_url(url: &Url) -> Self {
        let mut response = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut response.code,
                "state" => &mut response.state,
                "error" => &mut response.error,
                "error_description" => &mut response.error_description,
                _ => continue,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        response
    }

    /// Provider error formatted as `error: description`.
    pub fn error_summary(&self) -> Option<String> {
        let error = self.error.as_deref()?;
        Some(match self.error_description.as_deref() {
            Some(description) => format!("{}: {}", error, description),
            None => error.to_string(),
        })
    }
}

/// OAuth2 token response
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

/// The user profile returned by the provider's `@me` endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub id: String,
    pub username: String,
    /// Avatar hash; `None` when the user has no custom avatar
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
}

impl IdentityProfile {
    /// Parses a profile body and rejects profiles without a usable id or username.
    pub fn from_json(body: &str) -> IdentityResult<Self> {
        let profile: IdentityProfile = serde_json::from_str(body)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> IdentityResult<()> {
        if self.id.trim().is_empty() {
            return Err(IdentityError::MissingField("id"));
        }
        if self.username.trim().is_empty() {
            return Err(IdentityError::MissingField("username"));
        }
        Ok(())
    }

    /// `{cdn}/avatars/{id}/{avatar}.png`, or `None` without an avatar hash.
    pub fn avatar_url(&self, cdn_base: &str) -> Option<String> {
        let avatar = self.avatar.as_deref().filter(|hash| !hash.is_empty())?;
        Some(format!(
            "{}/avatars/{}/{}.png",
            cdn_base.trim_end_matches('/'),
            self.id,
            avatar
        ))
    }

    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    pub fn to_identity(&self, provider_id: &str) -> IdentityResult<VerifiedIdentity> {
        let identity =
            VerifiedIdentity::new(provider_id, self.id.clone(), Some(self.username.clone()))?;
        Ok(identity.with_metadata(serde_json::json!({
            "avatar": self.avatar,
            "global_name": self.global_name,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_response_from_url() {
        let url = Url::parse("https://plork.store/?code=abc123&state=xyz&code=second").unwrap();
        let response = AuthorizationResponse::from_url(&url);

        assert_eq!(response.code.as_deref(), Some("abc123"));
        assert_eq!(response.state.as_deref(), Some("xyz"));
        assert!(response.error.is_none());
        assert!(response.error_summary().is_none());
    }

    #[test]
    fn test_authorization_response_error() {
        let url = Url::parse(
            "https://plork.store/?error=access_denied&error_description=The+resource+owner+denied",
        )
        .unwrap();
        let response = AuthorizationResponse::from_url(&url);

        assert!(response.code.is_none());
        assert_eq!(
            response.error_summary().as_deref(),
            Some("access_denied: The resource owner denied")
        );
    }

    #[test]
    fn test_token_response_minimal() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"tok1"}"#).unwrap();
        assert_eq!(token.access_token, "tok1");
        assert!(token.token_type.is_none());
        assert!(!format!("{:?}", token).contains("tok1"));
    }

    #[test]
    fn test_profile_avatar_url() {
        let profile =
            IdentityProfile::from_json(r#"{"id":"u1","username":"alice","avatar":"h1"}"#).unwrap();

        assert_eq!(
            profile.avatar_url("https://cdn.discordapp.com/").as_deref(),
            Some("https://cdn.discordapp.com/avatars/u1/h1.png")
        );
        assert_eq!(profile.display_name(), "alice");
    }

    #[test]
    fn test_profile_without_avatar() {
        let profile =
            IdentityProfile::from_json(r#"{"id":"u1","username":"alice","avatar":null}"#).unwrap();
        assert!(profile.avatar_url("https://cdn.discordapp.com").is_none());
    }

    #[test]
    fn test_profile_missing_required_fields() {
        assert!(IdentityProfile::from_json(r#"{"username":"alice"}"#).is_err());
        assert!(matches!(
            IdentityProfile::from_json(r#"{"id":"u1","username":""}"#),
            Err(IdentityError::MissingField("username"))
        ));
    }

    #[test]
    fn test_profile_to_identity() {
        let profile =
            IdentityProfile::from_json(r#"{"id":"u1","username":"alice","avatar":"h1"}"#).unwrap();
        let identity = profile.to_identity("discord").unwrap();

        assert_eq!(identity.provider_id, "discord");
        assert_eq!(identity.subject, "u1");
        assert_eq!(identity.display_name.as_deref(), Some("alice"));
        assert_eq!(identity.metadata.unwrap()["avatar"], "h1");
    }
}
