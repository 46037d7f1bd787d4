//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `BIBLIO_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the module TOML file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "BIBLIO_ROOT_FOLDER";

/// Environment variable overriding the TOML config file location
pub const CONFIG_FILE_ENV: &str = "BIBLIO_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "biblio.db";

/// Module TOML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub harvest: HarvestSettings,
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            logging: LoggingConfig::default(),
            harvest: HarvestSettings::default(),
            sources: SourcesConfig::default(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:5740".to_string()
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
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

/// Harvest tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSettings {
    /// Consecutive transient failures tolerated before a harvest aborts
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Page size requested from offset-paginated sources
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Outgoing request quota per source
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    /// Embedding service URL; similarity dedup is disabled when absent
    #[serde(default)]
    pub embedding_endpoint: Option<String>,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            page_size: default_page_size(),
            requests_per_second: default_requests_per_second(),
            embedding_endpoint: None,
        }
    }
}

fn default_max_restarts() -> u32 {
    10
}

fn default_page_size() -> u32 {
    100
}

fn default_requests_per_second() -> u32 {
    5
}

/// Credentials and endpoints for each harvest source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub scopus: Option<ApiSourceConfig>,
    #[serde(default)]
    pub open_alex: Option<ApiSourceConfig>,
    #[serde(default)]
    pub web_of_science: Option<ApiSourceConfig>,
    #[serde(default)]
    pub oai_pmh: Vec<NamedEndpoint>,
    #[serde(default)]
    pub skg_if: Vec<NamedEndpoint>,
}

/// A keyed JSON API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// A named repository endpoint (OAI-PMH or SKG-IF)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedEndpoint {
    pub name: String,
    pub base_url: String,
    /// OAI-PMH metadata prefix; ignored by SKG-IF endpoints
    #[serde(default = "default_metadata_prefix")]
    pub metadata_prefix: String,
}

fn default_metadata_prefix() -> String {
    "oai_dc".to_string()
}

impl SourcesConfig {
    /// Find a configured OAI-PMH endpoint by name
    pub fn oai_pmh_endpoint(&self, name: &str) -> Option<&NamedEndpoint> {
        self.oai_pmh.iter().find(|e| e.name == name)
    }

    /// Find a configured SKG-IF endpoint by name
    pub fn skg_if_endpoint(&self, name: &str) -> Option<&NamedEndpoint> {
        self.skg_if.iter().find(|e| e.name == name)
    }
}

/// Default TOML path for a module: `<config dir>/biblio/<module>.toml`
pub fn default_config_path(module_name: &str) -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("biblio")
        .join(format!("{}.toml", module_name))
}

/// Load TOML configuration
///
/// A missing file yields defaults with a warning; a malformed file is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;

    Ok(())
}

/// Resolves the root folder holding the database
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    /// Root folder given on the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Root folder read from the TOML file
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        let default = default_root_folder();
        info!(
            module = %self.module_name,
            "No root folder configured, using default {}",
            default.display()
        );
        default
    }
}

/// Creates the root folder and derives file locations inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("biblio"))
        .unwrap_or_else(|| PathBuf::from("./biblio_data"))
}
