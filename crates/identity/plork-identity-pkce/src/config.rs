//! OAuth2 client configuration.

use crate::error::{OAuth2Error, OAuth2Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DISCORD_AUTHORIZATION_ENDPOINT: &str = "https://discord.com/oauth2/authorize";
pub const DISCORD_TOKEN_ENDPOINT: &str = "https://discord.com/api/oauth2/token";
pub const DISCORD_PROFILE_ENDPOINT: &str = "https://discord.com/api/users/@me";
pub const DISCORD_AVATAR_CDN: &str = "https://cdn.discordapp.com";

/// Public-client configuration for one identity provider.
///
/// There is no client secret: possession of the PKCE verifier is what binds the
/// token request to the authorization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceClientConfig {
    pub provider_id: String,
    pub client_id: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub profile_endpoint: String,
    /// Base URL used to build avatar image links
    pub avatar_cdn: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub http_timeout_seconds: u64,
}

impl PkceClientConfig {
    /// Discord defaults with the `identify` scope.
    pub fn discord(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            provider_id: "discord".to_string(),
            client_id: client_id.into(),
            authorization_endpoint: DISCORD_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: DISCORD_TOKEN_ENDPOINT.to_string(),
            profile_endpoint: DISCORD_PROFILE_ENDPOINT.to_string(),
            avatar_cdn: DISCORD_AVATAR_CDN.to_string(),
            redirect_uri: redirect_uri.into(),
            scopes: vec!["identify".to_string()],
            http_timeout_seconds: 10,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    /// Points every provider endpoint at `base`, e.g. a staging or mock server.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.authorization_endpoint = format!("{}/oauth2/authorize", base);
        self.token_endpoint = format!("{}/api/oauth2/token", base);
        self.profile_endpoint = format!("{}/api/users/@me", base);
        self
    }

    pub fn with_avatar_cdn(mut self, cdn: impl Into<String>) -> Self {
        self.avatar_cdn = cdn.into();
        self
    }

    pub fn validate(&self) -> OAuth2Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(OAuth2Error::ConfigError("client_id must not be empty".into()));
        }

        if self.http_timeout_seconds == 0 {
            return Err(OAuth2Error::ConfigError(
                "http_timeout_seconds must be greater than 0".into(),
            ));
        }

        for (name, value) in [
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("profile_endpoint", &self.profile_endpoint),
            ("avatar_cdn", &self.avatar_cdn),
            ("redirect_uri", &self.redirect_uri),
        ] {
            Url::parse(value)
                .map_err(|e| OAuth2Error::ConfigError(format!("{} is not a valid URL: {}", name, e)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discord_defaults() {
        let config = PkceClientConfig::discord("1462789095787855914", "https://plork.store");

        assert_eq!(config.provider_id, "discord");
        assert_eq!(config.authorization_endpoint, DISCORD_AUTHORIZATION_ENDPOINT);
        assert_eq!(config.token_endpoint, DISCORD_TOKEN_ENDPOINT);
        assert_eq!(config.profile_endpoint, DISCORD_PROFILE_ENDPOINT);
        assert_eq!(config.scopes, vec!["identify".to_string()]);
        assert_eq!(config.http_timeout_seconds, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_url_override() {
        let config = PkceClientConfig::discord("client", "https://plork.store")
            .with_base_url("http://127.0.0.1:8080/");

        assert_eq!(
            config.authorization_endpoint,
            "http://127.0.0.1:8080/oauth2/authorize"
        );
        assert_eq!(config.token_endpoint, "http://127.0.0.1:8080/api/oauth2/token");
        assert_eq!(config.profile_endpoint, "http://127.0.0.1:8080/api/users/@me");
    }

    #[test]
    fn test_validation_failures() {
        let empty_client = PkceClientConfig::discord(" ", "https://plork.store");
        assert!(matches!(
            empty_client.validate(),
            Err(OAuth2Error::ConfigError(_))
        ));

        let bad_redirect = PkceClientConfig::discord("client", "not a url");
        assert!(matches!(
            bad_redirect.validate(),
            Err(OAuth2Error::ConfigError(_))
        ));

        let no_timeout = PkceClientConfig::discord("client", "https://plork.store").with_http_timeout(0);
        assert!(matches!(no_timeout.validate(), Err(OAuth2Error::ConfigError(_))));
    }
}
