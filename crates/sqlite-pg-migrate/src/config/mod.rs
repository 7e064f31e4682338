//! Configuration loading and validation.
//!
//! Configuration normally comes from the environment (optionally seeded from
//! a `.env` file); a YAML file with the same structure is accepted as well.

mod types;
mod validation;

pub use types::*;
pub use validation::MAX_BATCH_SIZE;

use crate::error::{MigrateError, Result};
use std::path::{Path, PathBuf};

/// Environment variable holding the SQLite file path.
pub const ENV_SOURCE_PATH: &str = "SOURCE_PATH";
/// Environment variable holding the target database name.
pub const ENV_TARGET_NAME: &str = "TARGET_NAME";
/// Environment variable holding the target user.
pub const ENV_TARGET_USER: &str = "TARGET_USER";
/// Environment variable holding the target password.
pub const ENV_TARGET_PASSWORD: &str = "TARGET_PASSWORD";
/// Environment variable holding the target host.
pub const ENV_TARGET_HOST: &str = "TARGET_HOST";
/// Optional override of the target schema.
pub const ENV_TARGET_SCHEMA: &str = "TARGET_SCHEMA";
/// Optional override of the batch size.
pub const ENV_BATCH_SIZE: &str = "BATCH_SIZE";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present;
    /// variables already set in the environment take precedence.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(MigrateError::Config(format!("cannot load .env: {}", e))),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| MigrateError::Config(format!("{} is not set", key)))
        };

        let batch_size = match lookup(ENV_BATCH_SIZE) {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                MigrateError::Config(format!(
                    "{} must be a positive integer, got '{}'",
                    ENV_BATCH_SIZE, raw
                ))
            })?,
            None => DEFAULT_BATCH_SIZE,
        };

        let config = Config {
            source: SourceConfig {
                path: PathBuf::from(required(ENV_SOURCE_PATH)?),
            },
            target: TargetConfig {
                host: required(ENV_TARGET_HOST)?,
                port: DEFAULT_PG_PORT,
                database: required(ENV_TARGET_NAME)?,
                user: required(ENV_TARGET_USER)?,
                password: required(ENV_TARGET_PASSWORD)?,
                schema: lookup(ENV_TARGET_SCHEMA).unwrap_or_else(|| "content".to_string()),
            },
            migration: MigrationConfig { batch_size },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
