//! Service configuration from environment variables

use crate::error::{AppError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_PRICING_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Hosted pricing function; calculations fail with a config error when unset
    pub pricing_url: Option<Url>,
    pub pricing_api_key: Option<String>,
    pub pricing_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            pricing_url: None,
            pricing_api_key: None,
            pricing_timeout: Duration::from_secs(DEFAULT_PRICING_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    /// Read `ROOFLINE_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let pricing_url = get("ROOFLINE_PRICING_URL")
            .map(|raw| {
                Url::parse(raw.trim()).map_err(|e| {
                    AppError::Config(format!("Invalid ROOFLINE_PRICING_URL '{}': {}", raw, e))
                })
            })
            .transpose()?;

        Ok(Self {
            host: get("ROOFLINE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("ROOFLINE_PORT", get("ROOFLINE_PORT"), DEFAULT_PORT)?,
            data_dir: get("ROOFLINE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            pricing_url,
            pricing_api_key: get("ROOFLINE_PRICING_KEY"),
            pricing_timeout: Duration::from_secs(parse_or(
                "ROOFLINE_PRICING_TIMEOUT_SECS",
                get("ROOFLINE_PRICING_TIMEOUT_SECS"),
                DEFAULT_PRICING_TIMEOUT_SECS,
            )?),
        })
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// SQLite database file inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("roofline.db")
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", key, value, e))),
        None => Ok(default),
    }
}
