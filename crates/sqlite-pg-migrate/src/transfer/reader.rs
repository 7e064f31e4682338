//! Batched extraction from either store.

use tracing::debug;

use crate::core::entry::{quote_ident, Entry, PRIMARY_KEY};
use crate::core::traits::{RowReader, SelectQuery};
use crate::core::value::Batch;
use crate::error::Result;

/// Lazy, finite sequence of batches over one table.
///
/// Each call to [`next_batch`](Self::next_batch) issues one bounded fetch.
/// The sequence ends the first time a fetch returns no rows and never yields
/// an empty batch. It cannot be restarted: once it has ended, or once a fetch
/// has failed, every further call returns `Ok(None)`.
pub struct BatchReader<'a, R: RowReader + ?Sized> {
    store: &'a R,
    entry: &'static Entry,
    batch_size: usize,
    columns: Vec<&'static str>,
    base_sql: String,
    offset: usize,
    batches: usize,
    finished: bool,
}

impl<'a, R: RowReader + ?Sized> BatchReader<'a, R> {
    /// Create a reader; the column naming rule follows the store's side.
    pub fn new(store: &'a R, entry: &'static Entry, batch_size: usize) -> Self {
        let side = store.side();
        let base_sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            entry.select_list(side),
            store.qualify_table(entry.table_name),
            quote_ident(PRIMARY_KEY)
        );

        Self {
            store,
            entry,
            batch_size: batch_size.max(1),
            columns: entry.physical_columns(side),
            base_sql,
            offset: 0,
            batches: 0,
            finished: false,
        }
    }

    /// Rendered query without the paging clause.
    pub fn base_sql(&self) -> &str {
        &self.base_sql
    }

    /// Number of batches yielded so far.
    pub fn batches_read(&self) -> usize {
        self.batches
    }

    /// Fetch the next batch, or `None` once the table is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }

        let query = SelectQuery {
            entry: self.entry,
            sql: format!(
                "{} LIMIT {} OFFSET {}",
                self.base_sql, self.batch_size, self.offset
            ),
            columns: self.columns.clone(),
            offset: self.offset,
            limit: self.batch_size,
        };

        let mut rows = match self.store.fetch_rows(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };

        if rows.is_empty() {
            debug!(
                "{}: {} exhausted after {} batches",
                self.entry.table_name,
                self.store.db_type(),
                self.batches
            );
            self.finished = true;
            return Ok(None);
        }

        rows.truncate(self.batch_size);
        self.offset += rows.len();
        self.batches += 1;

        debug!(
            "{}: read batch {} ({} rows) from {}",
            self.entry.table_name,
            self.batches,
            rows.len(),
            self.store.db_type()
        );

        Ok(Some(Batch::new(rows)))
    }

    /// Drain the remaining batches into a vector.
    pub async fn read_all(mut self) -> Result<Vec<Batch>> {
        let mut batches = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            batches.push(batch);
        }
        Ok(batches)
    }
}
