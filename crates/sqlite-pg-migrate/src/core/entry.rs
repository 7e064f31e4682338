//! Static descriptors for the migrated tables.
//!
//! The set of tables is closed, so each [`EntryKind`] maps to a `'static`
//! [`Entry`] holding the table name, the ordered column list and the foreign
//! keys the table depends on. The `modified` column is not part of any
//! descriptor: the writer sets it at insert time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which store a query runs against.
///
/// The two schemas agree on every column name except the creation
/// timestamp, which is `created_at` in the source and `created` in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSide {
    Source,
    Target,
}

/// Logical name of the creation timestamp column.
pub const CREATED: &str = "created";

/// Physical name of the creation timestamp column in the source store.
pub const SOURCE_CREATED: &str = "created_at";

/// Primary key column shared by every table.
pub const PRIMARY_KEY: &str = "id";

/// Column set by the writer on every insert.
pub const MODIFIED: &str = "modified";

/// Allowed values of `person_film_work.role`.
pub const PERSON_ROLES: &[&str] = &["actor", "director", "writer"];

/// Widest column list of any entry.
pub const MAX_COLUMNS: usize = 7;

/// Value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    Float,
    Date,
    Timestamp,
    /// Text restricted to a fixed set of values.
    Choice(&'static [&'static str]),
}

impl ColumnType {
    /// PostgreSQL cast applied to the bound parameter.
    pub fn pg_cast(&self) -> &'static str {
        match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Text | ColumnType::Choice(_) => "text",
            ColumnType::Float => "float8",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamptz",
        }
    }
}

/// One column of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
}

const fn col(name: &'static str, column_type: ColumnType) -> Column {
    Column {
        name,
        column_type,
        nullable: false,
    }
}

const fn nullable(name: &'static str, column_type: ColumnType) -> Column {
    Column {
        name,
        column_type,
        nullable: true,
    }
}

/// A foreign key from a junction table to a parent table's `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignRef {
    pub column: &'static str,
    pub parent: EntryKind,
}

/// Tables handled by the migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    FilmWork,
    Person,
    Genre,
    PersonFilmWork,
    GenreFilmWork,
}

impl EntryKind {
    /// Processing order: parents first, junction tables last.
    pub const MIGRATION_ORDER: [EntryKind; 5] = [
        EntryKind::FilmWork,
        EntryKind::Person,
        EntryKind::Genre,
        EntryKind::PersonFilmWork,
        EntryKind::GenreFilmWork,
    ];

    /// Descriptor for this table.
    pub fn entry(self) -> &'static Entry {
        match self {
            EntryKind::FilmWork => &FILM_WORK,
            EntryKind::Person => &PERSON,
            EntryKind::Genre => &GENRE,
            EntryKind::PersonFilmWork => &PERSON_FILM_WORK,
            EntryKind::GenreFilmWork => &GENRE_FILM_WORK,
        }
    }

    pub fn table_name(self) -> &'static str {
        self.entry().table_name
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Schema descriptor for one table.
#[derive(Debug, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub table_name: &'static str,
    pub columns: &'static [Column],
    pub references: &'static [ForeignRef],
}

static FILM_WORK: Entry = Entry {
    kind: EntryKind::FilmWork,
    table_name: "film_work",
    columns: &[
        col("id", ColumnType::Uuid),
        col("created", ColumnType::Timestamp),
        col("title", ColumnType::Text),
        nullable("description", ColumnType::Text),
        nullable("creation_date", ColumnType::Date),
        nullable("rating", ColumnType::Float),
        col("type", ColumnType::Text),
    ],
    references: &[],
};

static PERSON: Entry = Entry {
    kind: EntryKind::Person,
    table_name: "person",
    columns: &[
        col("id", ColumnType::Uuid),
        col("created", ColumnType::Timestamp),
        col("full_name", ColumnType::Text),
    ],
    references: &[],
};

static GENRE: Entry = Entry {
    kind: EntryKind::Genre,
    table_name: "genre",
    columns: &[
        col("id", ColumnType::Uuid),
        col("created", ColumnType::Timestamp),
        col("name", ColumnType::Text),
        nullable("description", ColumnType::Text),
    ],
    references: &[],
};

static PERSON_FILM_WORK: Entry = Entry {
    kind: EntryKind::PersonFilmWork,
    table_name: "person_film_work",
    columns: &[
        col("id", ColumnType::Uuid),
        col("created", ColumnType::Timestamp),
        col("person_id", ColumnType::Uuid),
        col("film_work_id", ColumnType::Uuid),
        nullable("role", ColumnType::Choice(PERSON_ROLES)),
    ],
    references: &[
        ForeignRef {
            column: "person_id",
            parent: EntryKind::Person,
        },
        ForeignRef {
            column: "film_work_id",
            parent: EntryKind::FilmWork,
        },
    ],
};

static GENRE_FILM_WORK: Entry = Entry {
    kind: EntryKind::GenreFilmWork,
    table_name: "genre_film_work",
    columns: &[
        col("id", ColumnType::Uuid),
        col("created", ColumnType::Timestamp),
        col("genre_id", ColumnType::Uuid),
        col("film_work_id", ColumnType::Uuid),
    ],
    references: &[
        ForeignRef {
            column: "genre_id",
            parent: EntryKind::Genre,
        },
        ForeignRef {
            column: "film_work_id",
            parent: EntryKind::FilmWork,
        },
    ],
};

/// Quote an identifier for SQLite or PostgreSQL (both accept double quotes).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Entry {
    /// Number of columns carried per row.
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    /// Index of a column by logical name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Physical column name on the given side.
    pub fn physical_column(&self, name: &'static str, side: StoreSide) -> &'static str {
        match (side, name) {
            (StoreSide::Source, CREATED) => SOURCE_CREATED,
            _ => name,
        }
    }

    /// Physical column names in entry order.
    pub fn physical_columns(&self, side: StoreSide) -> Vec<&'static str> {
        self.column_names()
            .map(|name| self.physical_column(name, side))
            .collect()
    }

    /// Quoted, comma-separated column list for a SELECT on the given side.
    pub fn select_list(&self, side: StoreSide) -> String {
        self.physical_columns(side)
            .into_iter()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Placeholder group for the `row_index`-th row of a multi-row insert.
    ///
    /// Yields one typed `$n` per column, numbered after the preceding rows,
    /// followed by `NOW()` for the `modified` column.
    pub fn placeholders(&self, row_index: usize) -> String {
        let base = row_index * self.arity();
        let params: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("${}::{}", base + i + 1, c.column_type.pg_cast()))
            .collect();
        format!("({}, NOW())", params.join(", "))
    }
}
