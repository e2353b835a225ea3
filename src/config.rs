use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

pub const DEFAULT_CONFIG_FILE: &str = "moth-catalog.json";
pub const DEFAULT_TOKEN_ENV: &str = "MOTH_CATALOG_DRIVE_TOKEN";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub drive: Option<DriveEntry>,
    #[serde(default)]
    pub persist_folder_cache: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DriveEntry {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub upload_base: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveConfig {
    pub api_base: String,
    pub upload_base: String,
    pub token_env: String,
}

impl DriveConfig {
    /// Bearer token read from the configured environment variable, if set.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Option<Utf8PathBuf>,
    pub drive: DriveConfig,
    pub persist_folder_cache: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the given file, or `moth-catalog.json` in the current directory.
    /// A missing default file means defaults; a missing explicit file is an
    /// error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = DriveConfig::default();
        let drive = match config.drive {
            Some(entry) => DriveConfig {
                api_base: entry.api_base.unwrap_or(defaults.api_base),
                upload_base: entry.upload_base.unwrap_or(defaults.upload_base),
                token_env: entry.token_env.unwrap_or(defaults.token_env),
            },
            None => defaults,
        };

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            data_dir: config
                .data_dir
                .filter(|dir| !dir.trim().is_empty())
                .map(Utf8PathBuf::from),
            drive,
            persist_folder_cache: config.persist_folder_cache.unwrap_or(false),
        }
    }
}
