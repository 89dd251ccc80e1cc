pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application directory name under the user config and cache directories
pub const APP_DIR: &str = "tfe-coverage";

/// Explicit config file path
pub const CONFIG_PATH_ENV: &str = "TFE_COVERAGE_CONFIG";
/// Default cloud scope when the config lists none
pub const SUBSCRIPTION_ENV: &str = "AZURE_SUBSCRIPTION_ID";
/// Cache TTL override, in seconds
pub const CACHE_TTL_ENV: &str = "TFE_COVERAGE_CACHE_TTL";
/// Stale-on-error override
pub const SERVE_STALE_ENV: &str = "TFE_COVERAGE_SERVE_STALE";

const CONFIG_CANDIDATES: [&str; 2] = ["coverage.local.yaml", "coverage.yaml"];
const PROJECT_DIR: &str = ".tfe-coverage";
const CACHE_FILE: &str = "inventory-cache.json";
const DEFAULT_TTL_SECS: u64 = 15 * 60;

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoverageConfig {
    pub cloud: CloudConfig,
    pub iac: IacConfig,

    /// Directory of pre-fetched raw inventory documents
    pub export_dir: Option<PathBuf>,

    pub cache: CacheConfig,
    pub normalization: NormalizationConfig,
    pub resource_types: ResourceTypesConfig,
    pub report: ReportConfig,

    /// File the config was read from, if any
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            cloud: CloudConfig::default(),
            iac: IacConfig::default(),
            export_dir: None,
            cache: CacheConfig::default(),
            normalization: NormalizationConfig::default(),
            resource_types: ResourceTypesConfig::default(),
            report: ReportConfig::default(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudConfig {
    /// Azure subscription ids to list
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IacConfig {
    /// Terraform Enterprise workspace names to read state from
    pub workspaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache file; defaults to `<cache dir>/tfe-coverage/inventory-cache.json`
    pub path: Option<PathBuf>,
    pub ttl_secs: u64,
    pub serve_stale_on_error: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            ttl_secs: DEFAULT_TTL_SECS,
            serve_stale_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizationConfig {
    /// Fail on the first invalid record instead of skipping it
    pub strict: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceTypesConfig {
    /// `PRIMARY_RESOURCE_TYPES.json` to use instead of the built-in list
    pub file: Option<PathBuf>,
    /// Compare every resource type
    pub all_types: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub output: Option<PathBuf>,
}

impl CoverageConfig {
    /// Parse a YAML config file; relative paths resolve against its directory
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            self.export_dir.as_mut(),
            self.cache.path.as_mut(),
            self.resource_types.file.as_mut(),
            self.report.output.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if self.cloud.scopes.is_empty() {
            if let Some(subscription) = env_var(SUBSCRIPTION_ENV) {
                tracing::debug!(subscription = %subscription, "Using default cloud scope from environment");
                self.cloud.scopes.push(subscription);
            }
        }

        if let Some(value) = env_var(CACHE_TTL_ENV) {
            self.cache.ttl_secs = value.parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnv {
                    name: CACHE_TTL_ENV,
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(value) = env_var(SERVE_STALE_ENV) {
            self.cache.serve_stale_on_error =
                parse_bool(&value).ok_or_else(|| ConfigError::InvalidEnv {
                    name: SERVE_STALE_ENV,
                    value: value.clone(),
                    reason: "expected true/false, yes/no, on/off or 1/0".to_string(),
                })?;
        }

        Ok(())
    }

    /// Cache file to use, falling back to the default location
    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => Ok(path.clone()),
            None => default_cache_path(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Default cache file location
pub fn default_cache_path() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir().ok_or(ConfigError::CacheDirNotFound)?;
    Ok(cache_dir.join(APP_DIR).join(CACHE_FILE))
}

/// Find the config file.
///
/// Search order:
/// 1. `TFE_COVERAGE_CONFIG` (must exist when set)
/// 2. Current directory: `coverage.local.yaml`, `coverage.yaml`
/// 3. `./.tfe-coverage/` with the same names
/// 4. `<config dir>/tfe-coverage/coverage.yaml`
///
/// Returns `None` when nothing is found; every setting has a default.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    // 1. explicit path
    if let Some(config_path) = env_var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound(path));
        }
        return Ok(Some(path));
    }

    let current_dir = std::env::current_dir()?;

    // 2. current directory
    for filename in &CONFIG_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // 3. project directory
    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir() {
        for filename in &CONFIG_CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(Some(path));
            }
        }
    }

    // 4. user config
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join(APP_DIR).join("coverage.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Load the config from `explicit` or discovery, then apply environment overrides
pub fn load_config(explicit: Option<&Path>) -> Result<CoverageConfig> {
    let path = match explicit {
        Some(path) if !path.exists() => return Err(ConfigError::ConfigFileNotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file()?,
    };

    let mut config = match path {
        Some(path) => CoverageConfig::from_file(path)?,
        None => {
            tracing::debug!("No config file found, using defaults");
            CoverageConfig::default()
        }
    };
    config.apply_env()?;
    Ok(config)
}
