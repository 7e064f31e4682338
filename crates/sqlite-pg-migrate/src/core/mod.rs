//! Core types shared by every stage of the migration.
//!
//! - [`entry`]: per-table schema descriptors and the processing order
//! - [`value`]: row values and batches
//! - [`traits`]: the reader/writer seams the stores implement

pub mod entry;
pub mod traits;
pub mod value;

pub use entry::{Column, ColumnType, Entry, EntryKind, ForeignRef, StoreSide};
pub use traits::{RowReader, SelectQuery, TargetWriter};
pub use value::{parse_date, parse_timestamp, Batch, Row, SqlNullType, SqlValue};
