use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plork_identity_core::ADMIN_PERMISSION;
use plork_identity_pkce::{
    AllowListPermissions, AttemptStore, CallbackOutcome, FileAttemptStore, FileSessionStore,
    OAuth2Error, PkceFlowManager, Session,
};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Log in to plork.store with a Discord account
#[derive(Parser, Debug)]
#[command(name = "plork-login")]
#[command(about = "Log in to plork.store with a Discord account")]
#[command(version = "0.1.0")]
pub struct Args {
    /// Configuration file (defaults to plork.toml or $PLORK_CONFIG_FILE)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the pending login and the session
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a login and print the Discord authorization URL
    Login,

    /// Finish a login with the URL Discord redirected the browser to
    Callback {
        /// The full redirect URL, including `code` and `state`
        url: String,
    },

    /// Show the logged in user
    Whoami,

    /// Forget the session and any pending login
    Logout,
}

impl Args {
    /// Load configuration and apply command line overrides
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = dir.clone();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }

        Ok(config)
    }
}

/// One login context backed by files in the configured data directory.
pub struct LoginApp {
    manager: PkceFlowManager,
    attempts: Arc<FileAttemptStore>,
}

impl LoginApp {
    pub fn from_config(config: &Config) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        debug!("Using data directory {}", data_dir.display());

        let attempts = Arc::new(FileAttemptStore::new(data_dir));
        let sessions = Arc::new(FileSessionStore::new(data_dir));
        let admins = AllowListPermissions::new(config.admin.discord_ids.iter().cloned());

        let manager = PkceFlowManager::new(config.client_config(), attempts.clone(), sessions)
            .context("Failed to set up the login flow")?
            .with_permissions(Arc::new(admins));

        Ok(Self { manager, attempts })
    }

    pub async fn run(&self, command: &Command, out: &mut impl Write) -> Result<()> {
        match command {
            Command::Login => self.login(out).await,
            Command::Callback { url } => self.callback(url, out).await,
            Command::Whoami => self.whoami(out).await,
            Command::Logout => self.logout(out).await,
        }
    }

    async fn login(&self, out: &mut impl Write) -> Result<()> {
        let url = self.manager.begin_login().await.map_err(user_facing)?;

        writeln!(out, "🔗 Open this URL in your browser to log in with Discord:")?;
        writeln!(out, "{}", url)?;
        writeln!(
            out,
            "Then run `plork-login callback <URL>` with the address you are redirected to."
        )?;
        Ok(())
    }

    async fn callback(&self, url: &str, out: &mut impl Write) -> Result<()> {
        match self.manager.handle_callback(url).await.map_err(user_facing)? {
            CallbackOutcome::NotACallback => {
                writeln!(out, "That URL is not a Discord login redirect.")?;
            }
            CallbackOutcome::Authenticated(session) => {
                writeln!(out, "✅ Logged in")?;
                self.describe(&session, out).await?;
            }
        }
        Ok(())
    }

    async fn whoami(&self, out: &mut impl Write) -> Result<()> {
        if let Some(session) = self.manager.restore_session().await.map_err(user_facing)? {
            return self.describe(&session, out).await;
        }

        if self.attempts.pending().await?.is_some() {
            writeln!(
                out,
                "⏳ Login pending. Finish it with `plork-login callback <URL>`."
            )?;
        } else {
            writeln!(out, "Not logged in.")?;
        }
        Ok(())
    }

    async fn logout(&self, out: &mut impl Write) -> Result<()> {
        self.manager.logout().await.map_err(user_facing)?;
        writeln!(out, "👋 Logged out")?;
        Ok(())
    }

    async fn describe(&self, session: &Session, out: &mut impl Write) -> Result<()> {
        match &session.profile {
            Some(profile) => {
                writeln!(out, "👤 {} ({})", profile.display_name(), profile.id)?;
                if let Some(avatar) = self.manager.avatar_url(profile) {
                    writeln!(out, "🖼️  {}", avatar)?;
                }
            }
            None => writeln!(out, "👤 Discord user (profile unavailable)")?,
        }

        let permissions = self.manager.permissions(session).await?;
        if permissions.iter().any(|p| p == ADMIN_PERMISSION) {
            writeln!(out, "🔑 Admin")?;
        }
        Ok(())
    }
}

/// Message a person logging in should see in place of the error chain
#[derive(Debug)]
struct UserMessage(&'static str);

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Keep the flow error as the source, but lead with the message a user should see
fn user_facing(error: OAuth2Error) -> anyhow::Error {
    let message = UserMessage(error.user_message());
    anyhow::Error::new(error).context(message)
}

/// Login failures print only their user message; anything else prints the full chain.
pub fn render_error(error: &anyhow::Error) -> String {
    if error.downcast_ref::<UserMessage>().is_some() {
        error.to_string()
    } else {
        format!("{:#}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let args = Args::try_parse_from(["plork-login", "login"]).unwrap();
        assert_eq!(args.command, Command::Login);
        assert!(!args.verbose);

        let args = Args::try_parse_from([
            "plork-login",
            "callback",
            "https://plork.store/?code=abc&state=xyz",
            "--data-dir",
            "/tmp/plork",
            "-v",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Callback {
                url: "https://plork.store/?code=abc&state=xyz".to_string()
            }
        );
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/plork")));
        assert!(args.verbose);
    }

    #[test]
    fn test_callback_requires_url() {
        assert!(Args::try_parse_from(["plork-login", "callback"]).is_err());
    }

    #[test]
    fn test_user_facing_leads_with_generic_message() {
        let error = user_facing(OAuth2Error::StateMismatch);
        assert_eq!(error.to_string(), "Invalid login attempt, please try again.");
        assert!(error.downcast_ref::<OAuth2Error>().is_some());
        assert_eq!(render_error(&error), "Invalid login attempt, please try again.");
    }

    #[test]
    fn test_config_errors_render_with_their_cause() {
        let mut config = Config::default();
        config.http.timeout_seconds = 0;

        let error = config.validate().unwrap_err();
        let rendered = render_error(&error);
        assert!(rendered.starts_with("Invalid Discord configuration: "));
        assert!(rendered.contains("http_timeout_seconds must be greater than 0"));
    }
}
