//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing environment variable, invalid YAML, bad value)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source (SQLite) query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target (PostgreSQL) query or constraint error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// The target rejected a batch on an integrity constraint
    #[error("Constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },

    /// A stored value could not be converted to the column's type
    #[error("Cannot decode {table}.{column}: {message}")]
    Decode {
        table: String,
        column: String,
        message: String,
    },

    /// A row does not have as many values as the table has columns
    #[error("Malformed batch for table {table}: row {row} has {found} values, expected {expected}")]
    MalformedBatch {
        table: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Source and target disagree on a field
    #[error(
        "Consistency check failed for {table}: batch {batch}, row {row}, column {column}: \
         source={source_value} target={target_value}"
    )]
    Mismatch {
        table: String,
        batch: usize,
        row: usize,
        column: String,
        source_value: String,
        target_value: String,
    },

    /// Source and target hold a different number of rows
    #[error("Consistency check failed for {table}: source has {source_rows} rows, target has {target_rows}")]
    RowCountMismatch {
        table: String,
        source_rows: usize,
        target_rows: usize,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Decode error
    pub fn decode(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::Decode {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a Constraint error
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Constraint {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error came out of the consistency verifier.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            MigrateError::Mismatch { .. } | MigrateError::RowCountMismatch { .. }
        )
    }

    /// Whether a store connection was lost or could not be acquired.
    ///
    /// These end a run; every other error fails only the current table.
    pub fn is_connectivity(&self) -> bool {
        match self {
            MigrateError::Pool { .. } => true,
            MigrateError::Target(e) => e.is_closed(),
            MigrateError::Source(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            e if e.is_connectivity() => 3,
            MigrateError::Mismatch { .. } | MigrateError::RowCountMismatch { .. } => 4,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
