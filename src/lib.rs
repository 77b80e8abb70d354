//! parquet-to-sqlite - Memory-aware Parquet to SQLite converter
//!
//! Streams a Parquet file into a single SQLite table without loading the
//! whole file. Rows are read in bounded chunks and each chunk is written in
//! its own transaction, so peak memory tracks the chunk size rather than the
//! file size.
//!
//! # Features
//!
//! - **Adaptive Chunking**: The chunk size is halved when the process uses
//!   more than half of 75% of available memory, never below a floor.
//!
//! - **Frozen Schema**: The table is created from the first chunk; every
//!   later chunk must match it.
//!
//! - **Destructive Rerun**: An existing `data_table` is replaced, so
//!   repeated runs never duplicate rows.
//!
//! - **Optional Index**: A single-column index `idx_<column>` after loading.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  Parquet file                    │
//! └────────────────────────┬─────────────────────────┘
//!                          │ RecordBatch (chunk_size rows)
//!                          ▼
//! ┌──────────────────────────────────────────────────┐
//! │                   Converter                      │
//! │  ┌──────────────┐        ┌──────────────────┐    │
//! │  │ BatchStream  │◄───────│ BatchSizeState   │    │
//! │  │ (shrinkable) │ shrink │ + MemoryProbe    │    │
//! │  └──────┬───────┘        └──────────────────┘    │
//! │         │                                        │
//! │         ▼                                        │
//! │  ┌──────────────────────────┐                    │
//! │  │  SqliteStore             │                    │
//! │  │  - replace on 1st chunk  │                    │
//! │  │  - 1 txn per chunk       │                    │
//! │  └──────────────────────────┘                    │
//! └────────────────────────┬─────────────────────────┘
//!                          ▼
//!               ┌──────────────────────┐
//!               │  SQLite (data_table) │
//!               └──────────────────────┘
//! ```
//!
//! # Limitations
//!
//! Conversions cannot be cancelled. If the process is killed, the committed
//! chunks stay in `data_table` and the table is incomplete; rerunning the
//! conversion replaces it.
//!
//! # Example
//!
//! ```bash
//! parquet-to-sqlite events.parquet -o events.db --index-column domain
//! sqlite3 events.db "SELECT domain, COUNT(*) FROM data_table GROUP BY domain"
//! ```

pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod memory;
pub mod parquet;
pub mod progress;
pub mod sizer;

pub use config::{CliArgs, ConvertConfig};
pub use convert::{
    convert_parquet_to_sqlite, ConvertOptions, ConvertState, ConvertStats, Converter,
    ProgressCallback,
};
pub use error::{ConvertError, Result};
pub use memory::{MemoryProbe, MemorySnapshot, SystemMemory};
pub use sizer::SizingMode;
