use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RatError;

pub const DEFAULT_ZENODO_API: &str = "https://zenodo.org/api";
pub const DEFAULT_RECORD_ID: &str = "15747417";
pub const CONFIG_FILE: &str = "rat-fetch.json";

const ENV_ZENODO_API: &str = "RAT_FETCH_ZENODO_API";
const ENV_RECORD: &str = "RAT_FETCH_RECORD";
const ENV_TIMEOUT: &str = "RAT_FETCH_TIMEOUT_SECS";
const ENV_MAX_RETRIES: &str = "RAT_FETCH_MAX_RETRIES";

/// On-disk shape of `rat-fetch.json`; every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub zenodo_api: Option<String>,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub compress_nifti: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub zenodo_api: String,
    pub record_id: String,
    pub timeout: Duration,
    pub max_retries: usize,
    pub compress_nifti: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            zenodo_api: DEFAULT_ZENODO_API.to_string(),
            record_id: DEFAULT_RECORD_ID.to_string(),
            timeout: Duration::from_secs(300),
            max_retries: 3,
            compress_nifti: true,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file (explicit path, or `rat-fetch.json` in the current
    /// directory when present) and applies environment overrides.
    pub fn resolve(path: Option<&str>) -> Result<FetchConfig, RatError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        let config = if path.is_some() || config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| RatError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| RatError::ConfigParse(err.to_string()))?
        } else {
            Config::default()
        };

        let resolved = Self::resolve_config(config)?;
        Self::apply_env(resolved, |key| std::env::var(key).ok())
    }

    pub fn resolve_config(config: Config) -> Result<FetchConfig, RatError> {
        let defaults = FetchConfig::default();
        let zenodo_api = config
            .zenodo_api
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or(defaults.zenodo_api);
        let record_id = config.record_id.unwrap_or(defaults.record_id);
        if record_id.trim().is_empty() {
            return Err(RatError::ConfigValue {
                key: "record_id".to_string(),
                value: record_id,
            });
        }

        Ok(FetchConfig {
            zenodo_api,
            record_id,
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            compress_nifti: config.compress_nifti.unwrap_or(defaults.compress_nifti),
        })
    }

    pub fn apply_env<F>(mut config: FetchConfig, lookup: F) -> Result<FetchConfig, RatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(api) = lookup(ENV_ZENODO_API) {
            config.zenodo_api = api.trim().trim_end_matches('/').to_string();
        }
        if let Some(record) = lookup(ENV_RECORD) {
            config.record_id = record.trim().to_string();
        }
        if let Some(value) = lookup(ENV_TIMEOUT) {
            let secs = value.trim().parse::<u64>().map_err(|_| RatError::ConfigValue {
                key: ENV_TIMEOUT.to_string(),
                value: value.clone(),
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            config.max_retries =
                value.trim().parse::<usize>().map_err(|_| RatError::ConfigValue {
                    key: ENV_MAX_RETRIES.to_string(),
                    value: value.clone(),
                })?;
        }
        Ok(config)
    }
}
