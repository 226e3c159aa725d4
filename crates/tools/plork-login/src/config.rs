//! Configuration for the login tool
//!
//! Sources, lowest precedence first:
//! - built-in defaults (the plork.store Discord application)
//! - a TOML file (`plork.toml`, or `PLORK_CONFIG_FILE`, or `--config`)
//! - environment variables with the `PLORK__` prefix, e.g. `PLORK__HTTP__TIMEOUT_SECONDS`
//! - the legacy variables `DISCORD_CLIENT_ID`, `DISCORD_REDIRECT_URI`,
//!   `PLORK_ADMIN_IDS` (comma separated) and `RUST_LOG`

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use plork_identity_pkce::{DISCORD_AVATAR_CDN, PkceClientConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,

    /// File the settings were read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,

    /// Legacy environment variables that replaced loaded values
    #[serde(skip)]
    pub env_overrides: Vec<&'static str>,
}

/// Discord application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,

    /// Replaces `https://discord.com` for all OAuth2 endpoints
    pub api_base: Option<String>,

    pub avatar_cdn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Applies to the token and profile requests
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `attempt.json` (pending login) and `session.json`
    pub data_dir: PathBuf,
}

/// Discord user ids that get the storefront admin controls.
///
/// Purely cosmetic: the backend must enforce admin rights on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub discord_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            client_id: "1462789095787855914".to_string(),
            redirect_uri: "https://plork.store".to_string(),
            scopes: vec!["identify".to_string()],
            api_base: None,
            avatar_cdn: DISCORD_AVATAR_CDN.to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".plork"),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            discord_ids: vec!["715175664193372171".to_string()],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file and the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_path = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let path = std::env::var("PLORK_CONFIG_FILE")
                    .unwrap_or_else(|_| "plork.toml".to_string());
                let path = PathBuf::from(path);
                path.exists().then_some(path)
            }
        };

        if let Some(path) = &config_path {
            builder = builder.add_source(File::from(path.as_path()));
        }

        builder = builder.add_source(Environment::with_prefix("PLORK").separator("__"));

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.source = config_path;
        settings.apply_env_overrides();
        settings.validate()?;

        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(client_id) = std::env::var("DISCORD_CLIENT_ID") {
            self.discord.client_id = client_id;
            self.env_overrides.push("DISCORD_CLIENT_ID");
        }

        if let Ok(redirect_uri) = std::env::var("DISCORD_REDIRECT_URI") {
            self.discord.redirect_uri = redirect_uri;
            self.env_overrides.push("DISCORD_REDIRECT_URI");
        }

        if let Ok(ids) = std::env::var("PLORK_ADMIN_IDS") {
            self.admin.discord_ids = parse_id_list(&ids);
            self.env_overrides.push("PLORK_ADMIN_IDS");
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
            self.env_overrides.push("RUST_LOG");
        }
    }

    /// Report where the settings came from. Loading happens before the
    /// subscriber exists, so this runs once tracing is initialised.
    pub fn log_sources(&self) {
        match &self.source {
            Some(path) => info!("Loaded configuration from {}", path.display()),
            None => debug!("No config file found, using defaults"),
        }

        for var in &self.env_overrides {
            debug!("Using {} environment variable", var);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.client_config()
            .validate()
            .context("Invalid Discord configuration")?;

        let valid_formats = ["pretty", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        // RUST_LOG style directives are allowed, so only plain levels are checked
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !level_lower.contains(['=', ',']) && !valid_levels.contains(&level_lower.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        Ok(())
    }

    pub fn client_config(&self) -> PkceClientConfig {
        let mut client =
            PkceClientConfig::discord(&self.discord.client_id, &self.discord.redirect_uri)
                .with_scopes(self.discord.scopes.clone())
                .with_http_timeout(self.http.timeout_seconds)
                .with_avatar_cdn(&self.discord.avatar_cdn);

        if let Some(base) = &self.discord.api_base {
            client = client.with_base_url(base);
        }

        client
    }
}

fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let client = config.client_config();
        assert_eq!(client.client_id, "1462789095787855914");
        assert_eq!(client.redirect_uri, "https://plork.store");
        assert_eq!(client.http_timeout_seconds, 10);
        assert_eq!(client.avatar_cdn, "https://cdn.discordapp.com");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[discord]
client_id = "123"
redirect_uri = "http://localhost:8080/callback"
api_base = "http://localhost:9999"

[http]
timeout_seconds = 3

[admin]
discord_ids = ["1", "2"]
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.source.as_deref(), Some(file.path()));
        assert_eq!(config.http.timeout_seconds, 3);
        assert_eq!(config.admin.discord_ids.len(), 2);

        let client = config.client_config();
        assert_eq!(client.token_endpoint, "http://localhost:9999/api/oauth2/token");
        assert_eq!(client.redirect_uri, "http://localhost:8080/callback");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.http.timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "plork_identity_pkce=debug,warn".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(
            parse_id_list(" 715175664193372171, ,42 "),
            vec!["715175664193372171".to_string(), "42".to_string()]
        );
    }
}
