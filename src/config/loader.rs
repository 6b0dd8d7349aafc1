//! Configuration Loader
//!
//! Environment-aware loading: discovers the base and environment YAML files,
//! applies `INDEXING__*` environment overrides and validates the result.

use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{ConfigResult, IndexingConfig};

const BASE_FILE_STEM: &str = "indexing";
const ENV_PREFIX: &str = "INDEXING";
const ENV_SEPARATOR: &str = "__";

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: IndexingConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Lets tests pick an environment without touching process-wide variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            indexing_queue = %config.queues.indexing_queue,
            execution_lock_timeout_seconds = config.locks.execution_lock_timeout_seconds,
            chunk_size = config.batch.chunk_size,
            "⚙️ Indexing configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: IndexingConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// INDEXING_ENV, then APP_ENV, defaulting to development
    pub fn detect_environment() -> String {
        std::env::var("INDEXING_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        std::env::var("INDEXING_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_and_merge_config(config_directory: &Path, environment: &str) -> ConfigResult<IndexingConfig> {
        let base = config_directory.join(format!("{BASE_FILE_STEM}.yaml"));
        let overlay = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.yaml"));

        // Both files are optional; a missing directory yields pure defaults
        let config = Config::builder()
            .add_source(File::new(&base.to_string_lossy(), FileFormat::Yaml).required(false))
            .add_source(File::new(&overlay.to_string_lossy(), FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize::<IndexingConfig>()?)
    }
}
