//! Batched movement of rows between the stores.
//!
//! [`BatchReader`] pages through a table in primary key order and
//! [`BatchWriter`] turns each page into a single conflict-tolerant insert.

mod reader;
mod writer;

pub use reader::BatchReader;
pub use writer::{BatchWriter, InsertStatement, WriteStats};
