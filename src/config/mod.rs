// backupclerk/src/config/mod.rs
pub mod instance;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::catalog::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::export::PollPolicy;

pub use instance::InstanceRef;

pub const DEFAULT_BACKUP_DIR: &str = "backups";
pub const DEFAULT_API_URL: &str = "https://api.scaleway.com";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60 * 60;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub secret_key: Option<String>,
    pub access_key: Option<String>,
    pub organization_id: Option<String>,
    pub default_region: Option<String>,
    pub database_ids: Option<Vec<String>>,
    pub backup_dir: Option<PathBuf>,
    pub api_url: Option<String>,
    pub sync_interval_secs: Option<u64>,
    pub page_size: Option<u32>,
    pub export_poll_interval_secs: Option<u64>,
    pub export_poll_max_interval_secs: Option<u64>,
    pub export_poll_backoff_factor: Option<u32>,
    pub export_poll_max_attempts: Option<u32>,
}

// Application's internal configuration structs
#[derive(Clone)]
pub struct ApiConfig {
    pub api_url: Url,
    pub secret_key: String,
    pub access_key: Option<String>,
    pub organization_id: Option<String>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_url", &self.api_url.as_str())
            .field("secret_key", &"<redacted>")
            .field("access_key", &self.access_key)
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub backup_dir: PathBuf,
    /// Instance identifiers as configured; parsed on every pass.
    pub instances: Vec<String>,
    pub default_region: Option<String>,
    pub interval: Duration,
    pub page_size: u32,
    pub poll: PollPolicy,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Reads `config_path` when it exists, then applies environment overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let raw = if config_path.exists() {
            load_raw_json_config(config_path)?
        } else {
            RawJsonConfig::default()
        };
        Self::from_sources(raw, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(raw: RawJsonConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|key| lookup(key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let secret_key = env(&["SCW_SECRET_KEY", "SCW_SECRET"])
            .or(raw.secret_key.filter(|s| !s.trim().is_empty()))
            .context("You need to specify your Scaleway secret key in SCW_SECRET_KEY (or secret_key in config.json)")?;

        let instances: Vec<String> = match env(&["DATABASE_IDS"]) {
            Some(list) => split_database_ids(&list),
            None => raw
                .database_ids
                .unwrap_or_default()
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        };
        if instances.is_empty() {
            anyhow::bail!(
                "There is nothing to do. You need to specify your database IDs in DATABASE_IDS (or database_ids in config.json)"
            );
        }

        let api_url_str = env(&["SCW_API_URL"])
            .or(raw.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&api_url_str)
            .with_context(|| format!("Invalid API URL: {}", api_url_str))?;
        if api_url.cannot_be_a_base() {
            anyhow::bail!("API URL {} cannot be used as a base URL", api_url_str);
        }

        let backup_dir = env(&["BACKUP_DIR"])
            .map(PathBuf::from)
            .or(raw.backup_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));
        if backup_dir.as_os_str().is_empty() {
            anyhow::bail!("backup_dir cannot be empty.");
        }

        let interval_secs = parse_env_number(&env, "SYNC_INTERVAL_SECS")?
            .or(raw.sync_interval_secs)
            .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS);
        if interval_secs == 0 {
            anyhow::bail!("SYNC_INTERVAL_SECS must be greater than zero");
        }

        let page_size = parse_env_number(&env, "PAGE_SIZE")?
            .or(raw.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            anyhow::bail!("PAGE_SIZE must be between 1 and {}, got {}", MAX_PAGE_SIZE, page_size);
        }

        let defaults = PollPolicy::default();
        let poll_interval = parse_env_number(&env, "EXPORT_POLL_INTERVAL_SECS")?
            .or(raw.export_poll_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.interval);
        if poll_interval.is_zero() {
            anyhow::bail!("EXPORT_POLL_INTERVAL_SECS must be greater than zero");
        }
        let poll_max_interval = parse_env_number(&env, "EXPORT_POLL_MAX_INTERVAL_SECS")?
            .or(raw.export_poll_max_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(poll_interval);
        let backoff_factor = parse_env_number(&env, "EXPORT_POLL_BACKOFF_FACTOR")?
            .or(raw.export_poll_backoff_factor)
            .unwrap_or(defaults.backoff_factor);
        let max_attempts = match parse_env_number::<u32, _>(&env, "EXPORT_POLL_MAX_ATTEMPTS")?
            .or(raw.export_poll_max_attempts)
        {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.max_attempts,
        };
        if backoff_factor == 0 {
            anyhow::bail!("EXPORT_POLL_BACKOFF_FACTOR must be at least 1");
        }

        Ok(AppConfig {
            api: ApiConfig {
                api_url,
                secret_key,
                access_key: env(&["SCW_ACCESS_KEY", "SCW_KEY"]).or(raw.access_key),
                organization_id: env(&["SCW_DEFAULT_ORGANIZATION_ID", "SCW_ORG_ID"])
                    .or(raw.organization_id),
            },
            sync: SyncConfig {
                backup_dir,
                instances,
                default_region: env(&["SCW_DEFAULT_REGION"])
                    .or(raw.default_region)
                    .filter(|r| !r.trim().is_empty()),
                interval: Duration::from_secs(interval_secs),
                page_size,
                poll: PollPolicy {
                    interval: poll_interval,
                    max_interval: poll_max_interval.max(poll_interval),
                    backoff_factor,
                    max_attempts,
                },
            },
        })
    }
}

pub fn load_raw_json_config(config_path: &Path) -> Result<RawJsonConfig> {
    let config_content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
    serde_json::from_str(&config_content).with_context(|| {
        format!(
            "Failed to parse JSON from config file at {}",
            config_path.display()
        )
    })
}

/// Splits the comma separated `DATABASE_IDS` list, dropping blank entries.
fn split_database_ids(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_env_number<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&[&str]) -> Option<String>,
{
    env(&[key])
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("{} must be a number, got {:?}", key, value))
        })
        .transpose()
}
