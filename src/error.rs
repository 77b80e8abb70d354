//! Error types for parquet-to-sqlite
//!
//! This module defines the error hierarchy for a conversion run:
//! - Source errors (missing file, unreadable Parquet, iteration misuse)
//! - SQLite destination errors (connection, schema, value encoding)
//! - Configuration and CLI errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Keep the originating cause in the chain so failures can be diagnosed
//! - Memory pressure is never an error; it only shrinks the batch size

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a conversion run
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Reading the Parquet source failed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Opening or preparing the SQLite destination failed
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A batch could not be written; the run is aborted
    #[error("Failed to write batch {batch}: {source}")]
    Write {
        batch: u64,
        #[source]
        source: DbError,
    },

    /// Index creation failed after all rows were written
    #[error("Failed to create index on '{column}': {source}")]
    Index {
        column: String,
        #[source]
        source: DbError,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// True when the run failed because the input file does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConvertError::Source(SourceError::NotFound { .. }))
    }

    /// True when the run failed while appending a batch
    pub fn is_write_error(&self) -> bool {
        matches!(self, ConvertError::Write { .. })
    }
}

/// Parquet source errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Input file does not exist
    #[error("Input file not found: '{path}'")]
    NotFound { path: PathBuf },

    /// File exists but could not be opened as Parquet
    #[error("Failed to open Parquet file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: parquet::errors::ParquetError,
    },

    /// Parquet decoding error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow error while decoding a batch
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// The batch sequence of this handle was already taken
    #[error("Batches of this source were already consumed; reopen the file to read again")]
    AlreadyConsumed,

    /// Batch size must be positive
    #[error("Invalid batch size {size}: must be at least 1")]
    InvalidBatchSize { size: usize },

    /// Delivered rows disagree with the file metadata
    #[error("Row count mismatch: metadata reports {expected} rows, {delivered} were read")]
    RowCountMismatch { expected: u64, delivered: u64 },

    /// I/O error opening the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite destination errors
#[derive(Error, Debug)]
pub enum DbError {
    /// The database file could not be opened
    #[error("Failed to open database at '{path}': {source}")]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Batch schema differs from the schema frozen by the first batch
    #[error("Schema mismatch: expected [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },

    /// The table was already created in this run
    #[error("Table '{table}' was already created in this run")]
    SchemaAlreadyCreated { table: String },

    /// Rows were appended before the table existed
    #[error("Table '{table}' has not been created yet")]
    SchemaNotCreated { table: String },

    /// Column is not part of the frozen schema
    #[error("Unknown column '{column}': not present in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// A value cannot be represented in SQLite
    #[error("Value out of range in column '{column}' at row {row}: {reason}")]
    ValueOutOfRange {
        column: String,
        row: usize,
        reason: String,
    },

    /// The connection was already released
    #[error("Database connection is already closed")]
    Closed,

    /// A value could not be rendered for storage
    #[error("Failed to encode column '{column}': {source}")]
    Encode {
        column: String,
        #[source]
        source: arrow::error::ArrowError,
    },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid chunk size
    #[error("Invalid {name} {size}: must be at least 1")]
    InvalidChunkSize { name: &'static str, size: usize },

    /// Input path error
    #[error("Invalid input path '{path}': {reason}")]
    InvalidInputPath { path: PathBuf, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Result type alias for ConvertError
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Result type alias for SourceError
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;
