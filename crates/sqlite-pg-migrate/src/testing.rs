//! In-memory stores and row fixtures for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::core::entry::{EntryKind, StoreSide};
use crate::core::traits::{RowReader, SelectQuery, TargetWriter};
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};
use crate::transfer::InsertStatement;

#[derive(Default)]
struct Inner {
    tables: Mutex<HashMap<EntryKind, Vec<Row>>>,
    failing_reads: Mutex<HashSet<EntryKind>>,
    statements: Mutex<Vec<(EntryKind, usize)>>,
    fetches: AtomicUsize,
    closes: AtomicUsize,
    disconnected: AtomicBool,
}

/// A store that keeps every table in memory.
///
/// Clones share the same tables, so a test can hand one clone to the code
/// under test and inspect the other afterwards. Inserts behave like the
/// PostgreSQL target: existing primary keys are skipped, NULLs in required
/// columns and dangling foreign keys reject the whole statement.
#[derive(Clone)]
pub struct MemoryStore {
    side: StoreSide,
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(side: StoreSide) -> Self {
        Self {
            side,
            inner: Arc::new(Inner::default()),
        }
    }

    /// Append rows to a table without any checks.
    pub fn seed(&self, kind: EntryKind, rows: Vec<Row>) {
        self.inner
            .tables
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .extend(rows);
    }

    /// Current rows of a table in insertion order.
    pub fn rows(&self, kind: EntryKind) -> Vec<Row> {
        self.inner
            .tables
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace one value of the row with the given id.
    pub fn set_value(&self, kind: EntryKind, id: Uuid, column: &str, value: SqlValue) {
        let idx = kind.entry().column_index(column).unwrap();
        let mut tables = self.inner.tables.lock().unwrap();
        let row = tables
            .get_mut(&kind)
            .and_then(|rows| rows.iter_mut().find(|r| r[0].as_uuid() == Some(id)))
            .unwrap();
        row[idx] = value;
    }

    /// Make every later fetch against this table fail.
    pub fn fail_reads_of(&self, kind: EntryKind) {
        self.inner.failing_reads.lock().unwrap().insert(kind);
    }

    /// Make every later read and insert fail as if the connection was lost.
    pub fn drop_connection(&self) {
        self.inner.disconnected.store(true, Ordering::SeqCst);
    }

    fn check_connected(&self) -> Result<()> {
        if self.inner.disconnected.load(Ordering::SeqCst) {
            return Err(MigrateError::pool(
                "connection refused",
                format!("acquiring {:?} connection", self.side),
            ));
        }
        Ok(())
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Row count of every insert statement executed, in order.
    pub fn statement_sizes(&self) -> Vec<usize> {
        self.inner
            .statements
            .lock()
            .unwrap()
            .iter()
            .map(|(_, rows)| *rows)
            .collect()
    }

    /// Number of insert statements executed against one table.
    pub fn statements_for(&self, kind: EntryKind) -> usize {
        self.inner
            .statements
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    fn kind_of(table: &str) -> Option<EntryKind> {
        EntryKind::MIGRATION_ORDER
            .into_iter()
            .find(|k| k.table_name() == table)
    }
}

#[async_trait]
impl RowReader for MemoryStore {
    fn side(&self) -> StoreSide {
        self.side
    }

    fn qualify_table(&self, table: &str) -> String {
        match self.side {
            StoreSide::Source => format!("\"{}\"", table),
            StoreSide::Target => format!("\"content\".\"{}\"", table),
        }
    }

    async fn fetch_rows(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_connected()?;
        let kind = query.entry.kind;

        if self.inner.failing_reads.lock().unwrap().contains(&kind) {
            return Err(MigrateError::Io(std::io::Error::other(format!(
                "read of {} failed",
                kind
            ))));
        }

        let mut rows = self.rows(kind);
        rows.sort_by_key(|r| r[0].as_uuid());
        Ok(rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        self.check_connected()?;
        let kind = Self::kind_of(table)
            .ok_or_else(|| MigrateError::Config(format!("unknown table {}", table)))?;
        Ok(self.rows(kind).len() as i64)
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TargetWriter for MemoryStore {
    async fn execute_insert(&self, statement: &InsertStatement) -> Result<u64> {
        self.check_connected()?;
        let entry = statement.entry;
        let mut tables = self.inner.tables.lock().unwrap();

        let existing: HashSet<Uuid> = tables
            .get(&entry.kind)
            .into_iter()
            .flatten()
            .filter_map(|r| r[0].as_uuid())
            .collect();

        let mut seen = HashSet::new();
        let mut accepted = Vec::new();

        for row in statement.param_rows() {
            for (column, value) in entry.columns.iter().zip(row) {
                if !column.nullable && value.is_null() {
                    return Err(MigrateError::constraint(
                        entry.table_name,
                        format!("null value in column \"{}\"", column.name),
                    ));
                }
            }

            for fk in entry.references {
                let idx = entry.column_index(fk.column).unwrap();
                let Some(parent_id) = row[idx].as_uuid() else {
                    continue;
                };
                let present = tables
                    .get(&fk.parent)
                    .into_iter()
                    .flatten()
                    .any(|r| r[0].as_uuid() == Some(parent_id));
                if !present {
                    return Err(MigrateError::constraint(
                        entry.table_name,
                        format!(
                            "insert violates foreign key: {}={} not present in {}",
                            fk.column, parent_id, fk.parent
                        ),
                    ));
                }
            }

            let id = row[0].as_uuid();
            let conflict = id.is_some_and(|id| existing.contains(&id) || !seen.insert(id));
            if !conflict {
                accepted.push(row.to_vec());
            }
        }

        let inserted = accepted.len() as u64;
        tables.entry(entry.kind).or_default().extend(accepted);
        self.inner
            .statements
            .lock()
            .unwrap()
            .push((entry.kind, statement.rows));

        Ok(inserted)
    }
}

/// Deterministic id for the `n`-th fixture row of a table.
pub fn fixture_id(kind: EntryKind, n: usize) -> Uuid {
    let table = EntryKind::MIGRATION_ORDER
        .iter()
        .position(|k| *k == kind)
        .unwrap() as u128;
    Uuid::from_u128(((table + 1) << 96) | n as u128)
}

/// Fixture creation time, with microseconds so normalization is exercised.
pub fn fixture_created(n: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 16, 20, 14, 9).unwrap()
        + Duration::minutes(n as i64)
        + Duration::microseconds(221_838)
}

pub fn genre_rows(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            vec![
                SqlValue::from(fixture_id(EntryKind::Genre, i)),
                SqlValue::from(fixture_created(i)),
                SqlValue::from(format!("Genre {}", i)),
                if i % 2 == 0 {
                    SqlValue::Null(SqlNullType::Text)
                } else {
                    SqlValue::from(format!("About genre {}", i))
                },
            ]
        })
        .collect()
}

pub fn person_row(n: usize) -> Row {
    vec![
        SqlValue::from(fixture_id(EntryKind::Person, n)),
        SqlValue::from(fixture_created(n)),
        SqlValue::from(format!("Person {}", n)),
    ]
}

pub fn person_rows(n: usize) -> Vec<Row> {
    (0..n).map(person_row).collect()
}

pub fn film_work_row(n: usize) -> Row {
    vec![
        SqlValue::from(fixture_id(EntryKind::FilmWork, n)),
        SqlValue::from(fixture_created(n)),
        SqlValue::from(format!("Film {}", n)),
        SqlValue::Null(SqlNullType::Text),
        NaiveDate::from_ymd_opt(1999, 3, 31)
            .map(SqlValue::from)
            .unwrap(),
        SqlValue::from(7.5),
        SqlValue::from("movie"),
    ]
}

pub fn film_work_rows(n: usize) -> Vec<Row> {
    (0..n).map(film_work_row).collect()
}

/// Link row `n` joining person `person` to film work `film`.
pub fn person_film_work_row(n: usize, person: Uuid, film: Uuid, role: &str) -> Row {
    vec![
        SqlValue::from(fixture_id(EntryKind::PersonFilmWork, n)),
        SqlValue::from(fixture_created(n)),
        SqlValue::from(person),
        SqlValue::from(film),
        SqlValue::from(role),
    ]
}

pub fn genre_film_work_row(n: usize, genre: Uuid, film: Uuid) -> Row {
    vec![
        SqlValue::from(fixture_id(EntryKind::GenreFilmWork, n)),
        SqlValue::from(fixture_created(n)),
        SqlValue::from(genre),
        SqlValue::from(film),
    ]
}

/// A consistent catalogue: every table populated, every link resolvable.
pub fn seed_catalogue(store: &MemoryStore, films: usize, people: usize, genres: usize) {
    store.seed(EntryKind::FilmWork, film_work_rows(films));
    store.seed(EntryKind::Person, person_rows(people));
    store.seed(EntryKind::Genre, genre_rows(genres));

    let roles = ["actor", "director", "writer"];
    let links = (0..people.min(films))
        .map(|i| {
            person_film_work_row(
                i,
                fixture_id(EntryKind::Person, i),
                fixture_id(EntryKind::FilmWork, i),
                roles[i % roles.len()],
            )
        })
        .collect();
    store.seed(EntryKind::PersonFilmWork, links);

    let links = (0..genres.min(films))
        .map(|i| {
            genre_film_work_row(
                i,
                fixture_id(EntryKind::Genre, i),
                fixture_id(EntryKind::FilmWork, i),
            )
        })
        .collect();
    store.seed(EntryKind::GenreFilmWork, links);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_ids_sort_in_creation_order() {
        let ids: Vec<Uuid> = (0..300).map(|i| fixture_id(EntryKind::Genre, i)).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_dropped_connection_fails_row_count() {
        let store = MemoryStore::new(StoreSide::Target);
        store.drop_connection();

        let err = store.row_count("genre").await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
