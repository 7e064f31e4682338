//! Post-migration consistency check.
//!
//! Reads every table from both stores with the same [`BatchReader`] contract
//! (each side applying its own column naming rule) and compares the batches
//! field by field after [`normalize`]. The first difference stops the check.

pub mod normalize;

pub use normalize::{normalize_timestamp, normalize_value, Normalized};

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::entry::EntryKind;
use crate::core::traits::RowReader;
use crate::core::value::Batch;
use crate::error::{MigrateError, Result};
use crate::transfer::BatchReader;

/// Outcome of a successful check of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub table: EntryKind,
    /// Batch pairs compared.
    pub batches: usize,
    /// Rows compared.
    pub rows: usize,
    pub duration_ms: u64,
}

/// Compares source and target table by table.
pub struct ConsistencyVerifier<'a, S: ?Sized, T: ?Sized> {
    source: &'a S,
    target: &'a T,
    batch_size: usize,
}

impl<'a, S, T> ConsistencyVerifier<'a, S, T>
where
    S: RowReader + ?Sized,
    T: RowReader + ?Sized,
{
    pub fn new(source: &'a S, target: &'a T, batch_size: usize) -> Self {
        Self {
            source,
            target,
            batch_size,
        }
    }

    /// Check every table in migration order, stopping at the first failure.
    pub async fn verify_all(&self) -> Result<Vec<VerifyReport>> {
        let mut reports = Vec::with_capacity(EntryKind::MIGRATION_ORDER.len());
        for kind in EntryKind::MIGRATION_ORDER {
            reports.push(self.verify_table(kind).await?);
        }
        Ok(reports)
    }

    /// Check one table.
    ///
    /// Fails with [`MigrateError::Mismatch`] on the first differing field and
    /// with [`MigrateError::RowCountMismatch`] when one side has rows the
    /// other lacks.
    pub async fn verify_table(&self, kind: EntryKind) -> Result<VerifyReport> {
        let start = Instant::now();
        let entry = kind.entry();

        let mut source = BatchReader::new(self.source, entry, self.batch_size);
        let mut target = BatchReader::new(self.target, entry, self.batch_size);

        let mut batches = 0;
        let mut rows = 0;

        loop {
            let pair = (source.next_batch().await?, target.next_batch().await?);
            let (src, tgt) = match pair {
                (None, None) => break,
                (Some(src), Some(tgt)) if src.len() == tgt.len() => (src, tgt),
                (src, tgt) => {
                    let source_rows = rows + len_of(&src) + remaining_rows(&mut source).await?;
                    let target_rows = rows + len_of(&tgt) + remaining_rows(&mut target).await?;
                    return Err(MigrateError::RowCountMismatch {
                        table: entry.table_name.to_string(),
                        source_rows,
                        target_rows,
                    });
                }
            };

            for (row_idx, (src_row, tgt_row)) in src.rows.iter().zip(&tgt.rows).enumerate() {
                for (column, (s, t)) in entry.columns.iter().zip(src_row.iter().zip(tgt_row)) {
                    let (s, t) = (normalize_value(s), normalize_value(t));
                    if s != t {
                        return Err(MigrateError::Mismatch {
                            table: entry.table_name.to_string(),
                            batch: batches,
                            row: row_idx,
                            column: column.name.to_string(),
                            source_value: s.to_string(),
                            target_value: t.to_string(),
                        });
                    }
                }
            }

            batches += 1;
            rows += src.len();
            debug!("{}: batch {} consistent ({} rows)", kind, batches, src.len());
        }

        info!("{}: {} rows consistent", kind, rows);

        Ok(VerifyReport {
            table: kind,
            batches,
            rows,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn len_of(batch: &Option<Batch>) -> usize {
    batch.as_ref().map_or(0, Batch::len)
}

async fn remaining_rows<R: RowReader + ?Sized>(reader: &mut BatchReader<'_, R>) -> Result<usize> {
    let mut rows = 0;
    while let Some(batch) = reader.next_batch().await? {
        rows += batch.len();
    }
    Ok(rows)
}
