use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

pub const DATABASE_URL_ENV: &str = "BOOK_CLUB_DATABASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Directory for the daily rotated log file, stdout when unset
    pub log_dir: Option<PathBuf>,
    pub session_expiry_days: i64,
    pub secure_cookies: bool,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://database/book_club.db".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            log_dir: None,
            session_expiry_days: 5,
            secure_cookies: false,
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl Config {
    /// Loads the TOML config file, falling back to defaults when it doesn't exist.
    /// `BOOK_CLUB_DATABASE_URL` (from the environment or `.env`) overrides the database url.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)?
        } else {
            info!("config file {} not found, using defaults", path.display());
            Self::default()
        };
        let _ = dotenvy::dotenv();
        if let Ok(url) = dotenvy::var(DATABASE_URL_ENV) {
            config.database_url = url;
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config = toml::from_str::<Config>(content)?;
        if config.session_expiry_days <= 0 {
            anyhow::bail!("session_expiry_days must be positive");
        }
        Ok(config)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("port = 9000\nlog_dir = \"logs\"").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.session_expiry_days, 5);
        assert_eq!(config.address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_expiry() {
        assert!(Config::from_toml("session_expiry_days = 0").is_err());
    }
}
