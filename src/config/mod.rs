//! Configuration management
//!
//! This module handles loading and parsing configuration for the Confmate backend.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// OAuth provider configuration
    #[serde(default)]
    pub oauth: OAuthConfig,
    /// Administrator gate configuration
    #[serde(default)]
    pub admin: AdminConfig,
    /// Usage counter configuration
    #[serde(default)]
    pub usage: UsageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for the admin panel)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/confmate.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// OAuth provider configuration (Facebook graph API in production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Provider authorization dialogue URL
    #[serde(default = "default_authorization_url")]
    pub authorization_url: String,
    /// Provider graph API base URL (token exchange and profile fetch)
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    /// Our client ID
    #[serde(default)]
    pub client_id: String,
    /// Our client secret
    #[serde(default)]
    pub client_secret: String,
    /// Redirect URI registered with the provider
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_url: default_authorization_url(),
            graph_url: default_graph_url(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
        }
    }
}

fn default_authorization_url() -> String {
    "https://www.facebook.com/v3.2/dialog/oauth".to_string()
}

fn default_graph_url() -> String {
    "https://graph.facebook.com/v3.2".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/api/oauth/callback".to_string()
}

/// Administrator gate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Argon2 PHC hash of the administrator password.
    /// An empty hash disables admin authentication entirely.
    #[serde(default)]
    pub password_hash: String,
}

/// Usage counter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Seconds between usage counter drains
    #[serde(default = "default_drain_interval")]
    pub drain_interval_secs: u64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: default_drain_interval(),
        }
    }
}

fn default_drain_interval() -> u64 {
    120
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file.
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides.
    ///
    /// Environment variables follow the pattern:
    /// - CONFMATE_SERVER_HOST
    /// - CONFMATE_SERVER_PORT
    /// - CONFMATE_DATABASE_DRIVER
    /// - CONFMATE_DATABASE_URL
    /// - CONFMATE_OAUTH_CLIENT_ID
    /// - CONFMATE_OAUTH_CLIENT_SECRET
    /// - CONFMATE_OAUTH_REDIRECT_URI
    /// - CONFMATE_ADMIN_PASSWORD_HASH
    /// - CONFMATE_USAGE_DRAIN_INTERVAL_SECS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CONFMATE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CONFMATE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("CONFMATE_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("CONFMATE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {
                    tracing::warn!("Unknown database driver '{}', keeping configured value", driver)
                }
            }
        }
        if let Ok(url) = std::env::var("CONFMATE_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(client_id) = std::env::var("CONFMATE_OAUTH_CLIENT_ID") {
            self.oauth.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("CONFMATE_OAUTH_CLIENT_SECRET") {
            self.oauth.client_secret = client_secret;
        }
        if let Ok(redirect_uri) = std::env::var("CONFMATE_OAUTH_REDIRECT_URI") {
            self.oauth.redirect_uri = redirect_uri;
        }

        if let Ok(hash) = std::env::var("CONFMATE_ADMIN_PASSWORD_HASH") {
            self.admin.password_hash = hash;
        }

        if let Ok(secs) = std::env::var("CONFMATE_USAGE_DRAIN_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.usage.drain_interval_secs = secs;
            }
        }
    }
}
