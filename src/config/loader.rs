//! Configuration Loader
//!
//! Environment-aware configuration loading built on the `config` crate.
//! Sources are merged in order, later sources winning:
//!
//! 1. compiled-in defaults (`AppstoreConfig::default()`)
//! 2. `<dir>/appstore.yaml`
//! 3. `<dir>/appstore.<env>.yaml`
//! 4. `APPSTORE__<SECTION>__<KEY>` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::AppstoreConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_STEM: &str = "appstore";
const ENV_PREFIX: &str = "APPSTORE";

pub struct ConfigManager {
    config: AppstoreConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let explicit = config_dir.is_some();
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        if explicit && !config_directory.is_dir() {
            return Err(ConfigurationError::DirectoryNotFound(
                config_directory.display().to_string(),
            ));
        }

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            kubectl = %config.cluster.kubectl,
            cycle_limit = config.restart.cycle_limit,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: AppstoreConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &AppstoreConfig {
        &self.config
    }

    /// JSON rendering of the effective configuration for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<AppstoreConfig> {
        let defaults = Config::try_from(&AppstoreConfig::default())?;

        let base_path = config_directory.join(format!("{BASE_FILE_STEM}.yaml"));
        let env_path = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.yaml"));

        if base_path.exists() {
            debug!("Found configuration file: {}", base_path.display());
        }
        if env_path.exists() {
            debug!(
                "Applying environment overrides for '{}' from {}",
                environment,
                env_path.display()
            );
        }

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_path.clone()).format(FileFormat::Yaml).required(false))
            .add_source(File::from(env_path.clone()).format(FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(base_path.display().to_string(), e))?;

        merged
            .try_deserialize::<AppstoreConfig>()
            .map_err(|e| ConfigurationError::load_error(env_path.display().to_string(), e))
    }
}

/// Detect current environment: APPSTORE_ENV || APP_ENV || 'development'
pub fn detect_environment() -> String {
    env::var("APPSTORE_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
}
