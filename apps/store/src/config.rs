use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::init::InitOptions;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Only required when initializing a real store.
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
    pub app_env: String,
    pub seed_fixtures: bool,
    pub init_max_retries: u32,
    pub init_retry_delay_ms: u64,
    pub api_base_url: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, applying defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let seed_fixtures = match lookup("SEED_FIXTURES") {
            Some(raw) => parse_flag(&raw).context("SEED_FIXTURES must be a boolean")?,
            None => false,
        };

        Ok(Config {
            mongodb_uri: lookup("MONGODB_URI").filter(|v| !v.trim().is_empty()),
            mongodb_database: lookup("MONGODB_DATABASE").unwrap_or_else(|| "proxima".to_string()),
            app_env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
            seed_fixtures,
            init_max_retries: parse_or(&lookup, "INIT_MAX_RETRIES", 3)?,
            init_retry_delay_ms: parse_or(&lookup, "INIT_RETRY_DELAY_MS", 500)?,
            api_base_url: lookup("API_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self.app_env.trim().to_ascii_lowercase().as_str(),
            "production" | "prod"
        )
    }

    pub fn require_mongodb_uri(&self) -> Result<&str> {
        self.mongodb_uri
            .as_deref()
            .context("Required environment variable 'MONGODB_URI' is not set")
    }

    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            max_retries: self.init_max_retries,
            retry_delay: Duration::from_millis(self.init_retry_delay_ms),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("unrecognized flag value '{other}'"),
    }
}
