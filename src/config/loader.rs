//! Configuration File Loading
//!
//! Finds the TOML config file, falls back to defaults when none exists and
//! applies environment overrides on top.

use super::{ConfigError, CoreConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "PROJECTJAIL_CONFIG";

/// Configuration file loader
pub struct ConfigLoader {
    /// Candidate files, in priority order
    search_paths: Vec<PathBuf>,
    /// File the configuration was read from (if any)
    current_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader with the default search paths
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            current_path: None,
        }
    }

    /// Create a loader with explicit search paths
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            current_path: None,
        }
    }

    /// Load configuration from the default locations, then apply env overrides
    pub fn load() -> Result<CoreConfig, ConfigError> {
        let mut loader = Self::new();
        let mut config = loader.find_and_load()?;
        apply_env_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a specific file without consulting the environment
    pub fn load_from_path(path: &Path) -> Result<CoreConfig, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: CoreConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the file the last successful load read from
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Return the first existing config file, or defaults when there is none
    pub fn find_and_load(&mut self) -> Result<CoreConfig, ConfigError> {
        for path in &self.search_paths {
            if !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(path)?;
            let config: CoreConfig = toml::from_str(&content)?;
            debug!("Loaded configuration from {}", path.display());
            self.current_path = Some(path.clone());
            return Ok(config);
        }

        debug!("No configuration file found, using defaults");
        Ok(CoreConfig::default())
    }

    /// Get default search paths for configuration files
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(explicit) = env::var_os(CONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
            paths.push(PathBuf::from(explicit));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("projectjail").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".projectjail.toml"));
        }

        paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply the service's environment overrides using `lookup` to read variables
pub fn apply_env_overrides<F>(config: &mut CoreConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value })
    }

    if let Some(v) = lookup("MAX_FILE_READ_SIZE") {
        config.files.max_read_bytes = parse("MAX_FILE_READ_SIZE", v)?;
    }
    if let Some(v) = lookup("MAX_FILE_PREVIEW_SIZE") {
        config.files.max_preview_bytes = parse("MAX_FILE_PREVIEW_SIZE", v)?;
    }
    if let Some(v) = lookup("MAX_SHELL_TIMEOUT") {
        config.exec.max_timeout_secs = parse("MAX_SHELL_TIMEOUT", v)?;
    }
    if let Some(v) = lookup("DEFAULT_SHELL_TIMEOUT") {
        config.exec.default_timeout_secs = parse("DEFAULT_SHELL_TIMEOUT", v)?;
    }
    if let Some(v) = lookup("MAX_CONCURRENT_SHELLS") {
        config.terminal.max_sessions = parse("MAX_CONCURRENT_SHELLS", v)?;
    }

    Ok(())
}
