//! Conflict-tolerant multi-row inserts into the target store.

use tracing::{debug, warn};

use crate::core::entry::{quote_ident, Entry, MODIFIED, PRIMARY_KEY};
use crate::core::traits::{RowReader, TargetWriter};
use crate::core::value::{Batch, SqlValue};
use crate::error::{MigrateError, Result};

/// A rendered `INSERT ... ON CONFLICT DO NOTHING` with its bound values.
///
/// The SQL text is assembled from schema metadata only; every row value is
/// carried in `params` and bound by the target driver.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub entry: &'static Entry,
    pub sql: String,
    /// Bound values, row-major, `rows * entry.arity()` long.
    pub params: Vec<SqlValue>,
    pub rows: usize,
}

impl InsertStatement {
    /// Build the statement for a whole batch.
    ///
    /// Fails with [`MigrateError::MalformedBatch`] if any row's length differs
    /// from the entry's column count.
    pub fn build(qualified_table: &str, entry: &'static Entry, batch: &Batch) -> Result<Self> {
        let arity = entry.arity();

        for (i, row) in batch.rows.iter().enumerate() {
            if row.len() != arity {
                return Err(MigrateError::MalformedBatch {
                    table: entry.table_name.to_string(),
                    row: i,
                    expected: arity,
                    found: row.len(),
                });
            }
        }

        let col_list: String = entry
            .column_names()
            .chain(std::iter::once(MODIFIED))
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");

        let value_rows: Vec<String> = (0..batch.len()).map(|i| entry.placeholders(i)).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO NOTHING",
            qualified_table,
            col_list,
            value_rows.join(", "),
            quote_ident(PRIMARY_KEY)
        );

        let params = batch.rows.iter().flatten().cloned().collect();

        Ok(Self {
            entry,
            sql,
            params,
            rows: batch.len(),
        })
    }

    /// Iterate the bound values one row at a time.
    pub fn param_rows(&self) -> impl Iterator<Item = &[SqlValue]> {
        self.params.chunks(self.entry.arity().max(1))
    }
}

/// Outcome of writing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Rows sent to the target.
    pub attempted: u64,
    /// Rows the target actually inserted.
    pub inserted: u64,
}

impl WriteStats {
    /// Rows ignored because their primary key already existed.
    pub fn skipped(&self) -> u64 {
        self.attempted.saturating_sub(self.inserted)
    }
}

/// Writes batches into the target store, one statement per batch.
pub struct BatchWriter<'a, W: ?Sized> {
    target: &'a W,
    qualified_table: String,
    entry: &'static Entry,
}

impl<'a, W> BatchWriter<'a, W>
where
    W: RowReader + TargetWriter + ?Sized,
{
    pub fn new(target: &'a W, entry: &'static Entry) -> Self {
        Self {
            target,
            qualified_table: target.qualify_table(entry.table_name),
            entry,
        }
    }

    /// Insert a batch; existing primary keys are left untouched.
    pub async fn write(&self, batch: &Batch) -> Result<WriteStats> {
        if batch.is_empty() {
            return Ok(WriteStats::default());
        }

        let statement = InsertStatement::build(&self.qualified_table, self.entry, batch)?;
        let inserted = self.target.execute_insert(&statement).await?;

        let stats = WriteStats {
            attempted: statement.rows as u64,
            inserted,
        };

        if stats.skipped() > 0 {
            warn!(
                "{}: {} of {} rows already present, left unchanged",
                self.entry.table_name,
                stats.skipped(),
                stats.attempted
            );
        }
        debug!("{}: inserted {} rows", self.entry.table_name, stats.inserted);

        Ok(stats)
    }
}
