//! PostgreSQL target store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::TargetConfig;
use crate::core::entry::{quote_ident, Column, ColumnType, Entry, StoreSide};
use crate::core::traits::{RowReader, SelectQuery, TargetWriter};
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};
use crate::transfer::InsertStatement;

/// SQLSTATE class for integrity constraint violations.
const INTEGRITY_CONSTRAINT_CLASS: &str = "23";

/// PostgreSQL target store backed by a single pooled connection.
pub struct PgStore {
    pool: Pool,
    schema: String,
}

impl PgStore {
    /// Connect to the target and check the connection.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config(config), NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(1)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "connecting to PostgreSQL target"))?;

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL target connection"))?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{} (schema {})",
            config.host, config.port, config.database, config.schema
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "acquiring PostgreSQL connection"))
    }

    fn row_to_values(entry: &Entry, row: &tokio_postgres::Row) -> Result<Row> {
        entry
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| decode_column(entry, column, row, idx))
            .collect()
    }
}

/// Build the driver configuration, pinning `search_path` to the target schema.
fn pg_config(config: &TargetConfig) -> PgConfig {
    let mut pg_config = PgConfig::new();
    pg_config.host(&config.host);
    pg_config.port(config.port);
    pg_config.dbname(&config.database);
    pg_config.user(&config.user);
    pg_config.password(&config.password);
    pg_config.options(format!("-c search_path={}", config.schema));
    pg_config
}

fn decode_column(
    entry: &Entry,
    column: &Column,
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<SqlValue> {
    let bad = |message: String| MigrateError::decode(entry.table_name, column.name, message);

    let value = match column.column_type {
        ColumnType::Uuid => row
            .try_get::<_, Option<Uuid>>(idx)
            .map(|v| v.map(SqlValue::Uuid)),
        ColumnType::Timestamp => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map(SqlValue::Timestamp)),
        ColumnType::Date => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map(|v| v.map(SqlValue::Date)),
        ColumnType::Float => row
            .try_get::<_, Option<f64>>(idx)
            .map(|v| v.map(SqlValue::F64)),
        ColumnType::Text | ColumnType::Choice(_) => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map(SqlValue::Text)),
    }
    .map_err(|e| bad(e.to_string()))?;

    match value {
        None if column.nullable => Ok(SqlValue::Null(SqlNullType::from(column.column_type))),
        None => Err(bad("NULL in a required column".to_string())),
        Some(SqlValue::Text(text)) => match column.column_type {
            ColumnType::Choice(allowed) if !allowed.contains(&text.as_str()) => Err(bad(format!(
                "{:?} is not one of {}",
                text,
                allowed.join(", ")
            ))),
            _ => Ok(SqlValue::Text(text)),
        },
        Some(v) => Ok(v),
    }
}

/// Convert a value to a typed parameter matching its placeholder cast.
fn sql_value_to_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null(SqlNullType::Uuid) => Box::new(None::<Uuid>),
        SqlValue::Null(SqlNullType::Text) => Box::new(None::<String>),
        SqlValue::Null(SqlNullType::F64) => Box::new(None::<f64>),
        SqlValue::Null(SqlNullType::Date) => Box::new(None::<NaiveDate>),
        SqlValue::Null(SqlNullType::Timestamp) => Box::new(None::<DateTime<Utc>>),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::F64(n) => Box::new(*n),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Timestamp(dt) => Box::new(*dt),
    }
}

/// Whether a SQLSTATE code is an integrity constraint violation.
fn is_constraint_violation(code: &str) -> bool {
    code.starts_with(INTEGRITY_CONSTRAINT_CLASS)
}

/// Map a failed insert, separating constraint violations from other errors.
fn insert_error(table: &str, err: tokio_postgres::Error) -> MigrateError {
    let violation = err
        .as_db_error()
        .filter(|db| is_constraint_violation(db.code().code()))
        .map(|db| db.message().to_string());

    match violation {
        Some(message) => MigrateError::constraint(table, message),
        None => MigrateError::Target(err),
    }
}

#[async_trait]
impl RowReader for PgStore {
    fn side(&self) -> StoreSide {
        StoreSide::Target
    }

    fn qualify_table(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    async fn fetch_rows(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let client = self.client().await?;
        let rows = client.query(query.sql.as_str(), &[]).await?;

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
        let client = self.client().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualify_table(table));
        let row = client.query_one(sql.as_str(), &[]).await?;
        Ok(row.try_get(0)?)
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

#[async_trait]
impl TargetWriter for PgStore {
    async fn execute_insert(&self, statement: &InsertStatement) -> Result<u64> {
        let params: Vec<Box<dyn ToSql + Sync + Send>> =
            statement.params.iter().map(sql_value_to_param).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let client = self.client().await?;
        client
            .execute(statement.sql.as_str(), &param_refs)
            .await
            .map_err(|e| insert_error(statement.entry.table_name, e))
    }
}
