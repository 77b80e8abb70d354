//! SQLite destination module
//!
//! Writes Arrow record batches into a single SQLite table.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              RecordBatch (from Parquet)             │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │  schema: frozen TableSchema from the first batch    │
//! │  encode: Arrow columns -> SQLite bind values        │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │  store: one transaction per batch, prepared insert  │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │              SQLite file (data_table)               │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod encode;
pub mod schema;
pub mod store;

pub use encode::BatchEncoder;
pub use schema::{ColumnDef, SqlType, TableSchema, TABLE_NAME};
pub use store::SqliteStore;
