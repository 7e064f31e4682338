//! Configuration validation.

use super::Config;
use crate::core::entry::MAX_COLUMNS;
use crate::error::{MigrateError, Result};

/// PostgreSQL accepts at most this many bind parameters per statement.
const PG_MAX_PARAMS: usize = 65_535;

/// Largest batch whose multi-row insert still fits in one statement.
pub const MAX_BATCH_SIZE: usize = PG_MAX_PARAMS / MAX_COLUMNS;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.path.as_os_str().is_empty() {
        return Err(MigrateError::Config("source.path is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema must not be empty".into()));
    }
    if config.target.port == 0 {
        return Err(MigrateError::Config("target.port must be non-zero".into()));
    }

    // Migration config validation
    let batch_size = config.migration.batch_size;
    if batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if batch_size > MAX_BATCH_SIZE {
        return Err(MigrateError::Config(format!(
            "migration.batch_size must be at most {} (got {})",
            MAX_BATCH_SIZE, batch_size
        )));
    }

    Ok(())
}
