//! Store seams used by the transfer pipeline.
//!
//! - [`RowReader`]: bounded row fetches from either store
//! - [`TargetWriter`]: multi-row inserts into the target store
//!
//! The reader, writer, orchestrator and verifier are written against these
//! traits only, so they run unchanged over SQLite, PostgreSQL or the
//! in-memory stores used in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::transfer::InsertStatement;

use super::entry::{Entry, StoreSide};
use super::value::Row;

/// One bounded page of a table, in primary key order.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    /// Descriptor used to decode the returned rows.
    pub entry: &'static Entry,
    /// Rendered SQL text.
    pub sql: String,
    /// Physical column names, in entry order.
    pub columns: Vec<&'static str>,
    /// Rows to skip.
    pub offset: usize,
    /// Maximum rows to return.
    pub limit: usize,
}

/// Read rows from a store.
#[async_trait]
pub trait RowReader: Send + Sync {
    /// Which naming rule this store follows.
    fn side(&self) -> StoreSide;

    /// Quoted, possibly schema-qualified, name for a table.
    fn qualify_table(&self, table: &str) -> String;

    /// Run a page query and decode every row by the entry's column types.
    ///
    /// Returns at most `query.limit` rows; an empty result means the table
    /// has no rows past `query.offset`.
    async fn fetch_rows(&self, query: &SelectQuery) -> Result<Vec<Row>>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Get the database type identifier (e.g., "sqlite", "postgres").
    fn db_type(&self) -> &str;

    /// Close the underlying connection.
    async fn close(&self);
}

/// Write rows into the target store.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Execute one multi-row insert.
    ///
    /// Returns the number of rows actually inserted; rows skipped because
    /// their primary key already exists are not counted.
    async fn execute_insert(&self, statement: &InsertStatement) -> Result<u64>;
}
