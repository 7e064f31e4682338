//! SQLite source store.
//!
//! Implements [`RowReader`] over a read-only SQLite file. Values are stored as
//! text (ids, timestamps, dates) or REAL (ratings) and decoded into typed
//! [`SqlValue`]s by the entry's column types.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row as _, ValueRef};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::entry::{quote_ident, Column, ColumnType, Entry, StoreSide};
use crate::core::traits::{RowReader, SelectQuery};
use crate::core::value::{parse_date, parse_timestamp, Row, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open an existing database file read-only.
    ///
    /// A missing file is an error; the file is never created.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| {
                MigrateError::pool(e, format!("opening SQLite source {}", path.display()))
            })?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing SQLite source connection"))?;

        info!("Opened SQLite source: {}", path.display());

        Ok(Self { pool })
    }

    /// Wrap an already configured pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_values(entry: &Entry, row: &SqliteRow) -> Result<Row> {
        entry
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| Self::decode_column(entry, column, row, idx))
            .collect()
    }

    fn decode_column(
        entry: &Entry,
        column: &Column,
        row: &SqliteRow,
        idx: usize,
    ) -> Result<SqlValue> {
        let bad = |message: String| MigrateError::decode(entry.table_name, column.name, message);

        let raw = row.try_get_raw(idx).map_err(|e| bad(e.to_string()))?;
        if raw.is_null() {
            if column.nullable {
                return Ok(SqlValue::Null(SqlNullType::from(column.column_type)));
            }
            return Err(MigrateError::decode(
                entry.table_name,
                column.name,
                "NULL in a required column",
            ));
        }

        match column.column_type {
            ColumnType::Float => row
                .try_get_unchecked::<f64, _>(idx)
                .map(SqlValue::F64)
                .map_err(|e| bad(e.to_string())),
            other => {
                let text = row
                    .try_get_unchecked::<String, _>(idx)
                    .map_err(|e| bad(e.to_string()))?;
                decode_text(other, &text).map_err(bad)
            }
        }
    }
}

/// Convert a stored text value to the column's type.
pub(crate) fn decode_text(
    column_type: ColumnType,
    text: &str,
) -> std::result::Result<SqlValue, String> {
    match column_type {
        ColumnType::Uuid => Uuid::parse_str(text.trim())
            .map(SqlValue::Uuid)
            .map_err(|e| format!("invalid UUID {:?}: {}", text, e)),
        ColumnType::Timestamp => parse_timestamp(text)
            .map(SqlValue::Timestamp)
            .ok_or_else(|| format!("invalid timestamp {:?}", text)),
        ColumnType::Date => parse_date(text)
            .map(SqlValue::Date)
            .ok_or_else(|| format!("invalid date {:?}", text)),
        ColumnType::Float => text
            .trim()
            .parse::<f64>()
            .map(SqlValue::F64)
            .map_err(|e| format!("invalid number {:?}: {}", text, e)),
        ColumnType::Text => Ok(SqlValue::Text(text.to_string())),
        ColumnType::Choice(allowed) => {
            if allowed.contains(&text) {
                Ok(SqlValue::Text(text.to_string()))
            } else {
                Err(format!("{:?} is not one of {}", text, allowed.join(", ")))
            }
        }
    }
}

#[async_trait]
impl RowReader for SqliteStore {
    fn side(&self) -> StoreSide {
        StoreSide::Source
    }

    fn qualify_table(&self, table: &str) -> String {
        quote_ident(table)
    }

    async fn fetch_rows(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let rows: Vec<SqliteRow> = sqlx::query(&query.sql).fetch_all(&self.pool).await?;

        debug!(
            "{}: fetched {} rows at offset {}",
            query.entry.table_name,
            rows.len(),
            query.offset
        );

        rows.iter()
            .map(|row| Self::row_to_values(query.entry, row))
            .collect()
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualify_table(table));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
