//! # sqlite-pg-migrate
//!
//! Batch migration of the movies catalogue from SQLite to PostgreSQL.
//!
//! The five catalogue tables (`film_work`, `person`, `genre`,
//! `person_film_work`, `genre_film_work`) are copied in dependency order:
//!
//! - **Batched extraction** in primary key order with a bounded batch size
//! - **Column reconciliation** between `created_at` (SQLite) and `created`
//! - **Idempotent inserts**: rows whose primary key already exists are skipped
//! - **Per-table results**: a failing table is reported, the rest still migrate
//! - **Consistency check** comparing every field of both stores
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> sqlite_pg_migrate::Result<()> {
//!     let config = Config::from_env()?;
//!     let mut orchestrator = Orchestrator::new(config).await?;
//!     let summary = orchestrator.run().await?;
//!     println!("Inserted {} rows", summary.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod transfer;
pub mod verify;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use crate::core::{Batch, Entry, EntryKind, SqlValue, StoreSide};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    MigrationSummary, Orchestrator, RowCountReport, RunPhase, TableOutcome, TableReport,
};
pub use source::SqliteStore;
pub use target::PgStore;
pub use transfer::{BatchReader, BatchWriter, InsertStatement, WriteStats};
pub use verify::{normalize_timestamp, ConsistencyVerifier, VerifyReport};
