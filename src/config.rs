use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{SurveyCode, default_surveys};
use crate::error::GeobinError;
use crate::foss::{DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
use crate::pacing::DEFAULT_PAUSE_SECS;

pub const DEFAULT_CONFIG_FILE: &str = "gap-geobin.json";
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub surveys: Option<Vec<String>>,
    #[serde(default)]
    pub pause_seconds: Option<u64>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub fail_fast: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub surveys: Vec<SurveyCode>,
    pub pause: Duration,
    pub base_url: String,
    pub page_size: u32,
    pub fail_fast: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: SUPPORTED_SCHEMA_VERSION,
            surveys: default_surveys(),
            pause: Duration::from_secs(DEFAULT_PAUSE_SECS),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            fail_fast: false,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads an explicit config file, or `gap-geobin.json` in the working
    /// directory when present, falling back to built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GeobinError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GeobinError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GeobinError::ConfigParse(err.to_string()))?;

        tracing::debug!(path = %config_path.display(), "loaded config");
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GeobinError> {
        let defaults = ResolvedConfig::default();

        let schema_version = config.schema_version.unwrap_or(defaults.schema_version);
        if schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(GeobinError::ConfigParse(format!(
                "unsupported schema_version {schema_version}, expected {SUPPORTED_SCHEMA_VERSION}"
            )));
        }

        let surveys = match config.surveys {
            Some(values) => {
                let surveys = values
                    .iter()
                    .map(|value| value.parse())
                    .collect::<Result<Vec<SurveyCode>, GeobinError>>()?;
                if surveys.is_empty() {
                    return Err(GeobinError::ConfigParse(
                        "surveys must list at least one survey code".to_string(),
                    ));
                }
                surveys
            }
            None => defaults.surveys,
        };

        Ok(ResolvedConfig {
            schema_version,
            surveys,
            pause: config
                .pause_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.pause),
            base_url: config.base_url.unwrap_or(defaults.base_url),
            page_size: config.page_size.unwrap_or(defaults.page_size),
            fail_fast: config.fail_fast.unwrap_or(defaults.fail_fast),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_legacy_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        let codes = resolved
            .surveys
            .iter()
            .map(SurveyCode::as_str)
            .collect::<Vec<_>>();
        assert_eq!(codes, vec!["NBS", "EBS", "BSS", "GOA"]);
        assert_eq!(resolved.pause, Duration::from_secs(5));
        assert!(!resolved.fail_fast);
    }
}
