//! Server configuration

use registration_core::Config as LedgerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Usernames that mean "SMTP not configured" (copied from sample `.env` files)
const PLACEHOLDER_SMTP_USERNAMES: &[&str] = &["your-email@gmail.com", "test@example.com"];

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address
    pub listen_addr: String,

    /// Emit JSON logs instead of human-readable ones
    pub json_logs: bool,

    /// Create the administrator account and a sample event on first start
    pub seed_sample_data: bool,

    /// Ledger configuration
    pub ledger: LedgerConfig,

    /// Outgoing mail configuration
    pub smtp: SmtpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            json_logs: false,
            seed_sample_data: true,
            ledger: LedgerConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

/// SMTP configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// SMTP relay host
    pub server: String,

    /// SMTP port (STARTTLS)
    pub port: u16,

    /// Authentication username, also used as sender address
    pub username: String,

    /// Authentication password
    pub password: String,

    /// Sender display name
    pub from_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from_name: "Event Management Team".to_string(),
        }
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_name", &self.from_name)
            .finish()
    }
}

impl SmtpConfig {
    /// Whether real mail delivery is configured
    pub fn is_configured(&self) -> bool {
        !self.server.is_empty()
            && !self.username.is_empty()
            && !PLACEHOLDER_SMTP_USERNAMES.contains(&self.username.as_str())
    }
}

impl ServerConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;
        config.ledger.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = ServerConfig {
            ledger: LedgerConfig::from_env()?,
            ..ServerConfig::default()
        };

        if let Ok(addr) = std::env::var("REGISTRATION_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(value) = std::env::var("REGISTRATION_JSON_LOGS") {
            config.json_logs = parse_flag("REGISTRATION_JSON_LOGS", &value)?;
        }

        if let Ok(value) = std::env::var("REGISTRATION_SEED_SAMPLE_DATA") {
            config.seed_sample_data = parse_flag("REGISTRATION_SEED_SAMPLE_DATA", &value)?;
        }

        if let Ok(server) = std::env::var("SMTP_SERVER") {
            config.smtp.server = server;
        }

        if let Ok(port) = std::env::var("SMTP_PORT") {
            config.smtp.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid SMTP_PORT {:?}: {}", port, e))?;
        }

        if let Ok(username) = std::env::var("SMTP_USERNAME") {
            config.smtp.username = username;
        }

        if let Ok(password) = std::env::var("SMTP_PASSWORD") {
            config.smtp.password = password;
        }

        Ok(config)
    }

    /// Load from `REGISTRATION_CONFIG` if set, else from the environment
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("REGISTRATION_CONFIG") {
            Ok(path) => Self::from_file(PathBuf::from(path)),
            Err(_) => Self::from_env(),
        }
    }
}

fn parse_flag(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("Invalid {}: {:?}", name, other)),
    }
}
