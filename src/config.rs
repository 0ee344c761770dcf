use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::ArchiveFormat;
use crate::error::BagError;

pub const CONFIG_FILE_NAME: &str = "encode2bag.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub base_path: Option<PathBuf>,
    #[serde(default)]
    pub archiver: Option<ArchiveFormat>,
    #[serde(default)]
    pub overwrite: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 0,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub http: HttpSettings,
    pub base_path: Option<PathBuf>,
    pub archiver: Option<ArchiveFormat>,
    pub overwrite: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicitly named file must exist; default locations are optional.
    pub fn resolve(path: Option<&Path>) -> Result<ResolvedConfig, BagError> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_locations().into_iter().find(|path| path.is_file()),
        };
        let Some(config_path) = config_path else {
            return Self::resolve_config(Config::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BagError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BagError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, BagError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(BagError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let defaults = HttpSettings::default();
        let timeout_secs = config.http.timeout_secs.unwrap_or(defaults.timeout_secs);
        if timeout_secs == 0 {
            return Err(BagError::ConfigParse(
                "http.timeout_secs must be greater than zero".to_string(),
            ));
        }
        let http = HttpSettings {
            timeout_secs,
            max_retries: config.http.max_retries.unwrap_or(defaults.max_retries),
            user_agent: config
                .http
                .user_agent
                .filter(|agent| !agent.trim().is_empty())
                .unwrap_or(defaults.user_agent),
        };

        Ok(ResolvedConfig {
            schema_version,
            http,
            base_path: config.output.base_path,
            archiver: config.output.archiver,
            overwrite: config.output.overwrite.unwrap_or(false),
        })
    }
}

pub fn default_user_agent() -> String {
    format!("encode2bag/{}", env!("CARGO_PKG_VERSION"))
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dirs) = ProjectDirs::from("org", "encode2bag", "encode2bag") {
        locations.push(dirs.config_dir().join("config.json"));
    }
    locations
}
