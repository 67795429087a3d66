use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign session tokens.
    /// Empty means "generate one at startup".
    #[serde(default)]
    pub jwt_secret: String,
    /// Lifetime of access tokens in hours (default: 24)
    #[serde(default = "default_access_token_ttl_hours")]
    pub access_token_ttl_hours: i64,
    /// Lifetime of refresh tokens in days (default: 7)
    #[serde(default = "default_refresh_token_ttl_days")]
    pub refresh_token_ttl_days: i64,
    /// Bootstrap administrator, created at startup if no user has this username
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// No bootstrap admin is created when unset
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_hours: default_access_token_ttl_hours(),
            refresh_token_ttl_days: default_refresh_token_ttl_days(),
            admin_username: default_admin_username(),
            admin_email: default_admin_email(),
            admin_password: None,
        }
    }
}

impl AuthConfig {
    /// Fill in a random signing secret when none was configured.
    /// Returns true if a secret had to be generated.
    pub fn ensure_secret(&mut self) -> bool {
        if !self.jwt_secret.trim().is_empty() {
            return false;
        }
        let bytes: [u8; 32] = rand::random();
        self.jwt_secret = hex::encode(bytes);
        true
    }
}

fn default_access_token_ttl_hours() -> i64 {
    24
}

fn default_refresh_token_ttl_days() -> i64 {
    7
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_email() -> String {
    "admin@reviewdesk.local".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            jwt_secret = "s3cret"
            access_token_ttl_hours = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.access_token_ttl_hours, 2);
        assert_eq!(config.auth.refresh_token_ttl_days, 7);
        assert_eq!(config.server.api_port, 8080);
        assert_eq!(config.logging.level, "info");
        assert!(config.auth.admin_password.is_none());
    }

    #[test]
    fn test_ensure_secret_only_generates_when_missing() {
        let mut auth = AuthConfig::default();
        assert!(auth.ensure_secret());
        assert_eq!(auth.jwt_secret.len(), 64);

        let generated = auth.jwt_secret.clone();
        assert!(!auth.ensure_secret());
        assert_eq!(auth.jwt_secret, generated);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/reviewdesk.toml")).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.auth.jwt_secret.is_empty());
    }
}
