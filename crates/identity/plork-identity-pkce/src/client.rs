//! OAuth2 client implementation with PKCE support.

use crate::config::PkceClientConfig;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::{IdentityProfile, TokenResponse};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, thread_rng};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 32;

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Fresh anti-CSRF `state` value (256 bits, base64url).
pub fn generate_state() -> String {
    random_token(STATE_BYTES)
}

/// PKCE code challenge and verifier
#[derive(Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .field("code_challenge_method", &self.code_challenge_method)
            .finish()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn new() -> Self {
        Self::from_verifier(random_token(VERIFIER_BYTES))
    }

    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = Self::generate_code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256",
        }
    }

    pub fn generate_code_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let result = hasher.finalize();
        URL_SAFE_NO_PAD.encode(result)
    }
}

/// HTTP side of the flow: authorization URL, token exchange and profile lookup
#[derive(Clone)]
pub struct OAuth2Client {
    http_client: Client,
}

impl OAuth2Client {
    pub fn new(http_timeout_seconds: u64) -> OAuth2Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(http_timeout_seconds))
            .build()?;

        Ok(Self { http_client })
    }

    /// Authorization URL for a prepared challenge and state. Makes no request.
    pub fn authorization_url(
        &self,
        provider_config: &PkceClientConfig,
        pkce: &PkceChallenge,
        state: &str,
    ) -> OAuth2Result<Url> {
        let mut url = Url::parse(&provider_config.authorization_endpoint)?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &provider_config.client_id)
            .append_pair("redirect_uri", &provider_config.redirect_uri)
            .append_pair("scope", &provider_config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", pkce.code_challenge_method);

        debug!(
            "Generated authorization URL for provider {}",
            provider_config.provider_id
        );

        Ok(url)
    }

    /// Redeem an authorization code. Issues exactly one request and never retries.
    pub async fn exchange_code(
        &self,
        provider_config: &PkceClientConfig,
        code: &str,
        code_verifier: &str,
    ) -> OAuth2Result<TokenResponse> {
        let params = [
            ("client_id", provider_config.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", provider_config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http_client
            .post(&provider_config.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| timeout_as(e, OAuth2Error::TokenExchangeFailed))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| timeout_as(e, OAuth2Error::TokenExchangeFailed))?;

        if !status.is_success() {
            error!("Token exchange failed with status {}: {}", status, body);
            return Err(OAuth2Error::TokenExchangeFailed(body));
        }

        // Some providers report errors with a 200 status
        let payload: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| OAuth2Error::TokenExchangeFailed(format!("invalid token response: {}", e)))?;
        if payload.get("error").is_some() {
            error!("Token exchange rejected by provider: {}", body);
            return Err(OAuth2Error::TokenExchangeFailed(body));
        }

        let token_response: TokenResponse = serde_json::from_value(payload)
            .map_err(|e| OAuth2Error::TokenExchangeFailed(format!("invalid token response: {}", e)))?;

        info!("Successfully exchanged code for tokens");
        Ok(token_response)
    }

    /// Fetch the profile of the user the access token belongs to
    pub async fn fetch_profile(
        &self,
        provider_config: &PkceClientConfig,
        access_token: &str,
    ) -> OAuth2Result<IdentityProfile> {
        let response = self
            .http_client
            .get(&provider_config.profile_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| timeout_as(e, OAuth2Error::ProfileFetchFailed))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| timeout_as(e, OAuth2Error::ProfileFetchFailed))?;

        if !status.is_success() {
            error!("Profile request failed with status {}: {}", status, body);
            return Err(OAuth2Error::ProfileFetchFailed(format!("{}: {}", status, body)));
        }

        let profile = IdentityProfile::from_json(&body)
            .map_err(|e| OAuth2Error::ProfileFetchFailed(e.to_string()))?;

        debug!("Successfully retrieved profile for user id: {}", profile.id);
        Ok(profile)
    }
}

/// Timeouts belong to the step that issued the request; other transport errors stay network errors.
fn timeout_as(err: reqwest::Error, step: fn(String) -> OAuth2Error) -> OAuth2Error {
    if err.is_timeout() {
        step(format!("request timed out: {}", err))
    } else {
        OAuth2Error::NetworkError(err)
    }
}
