//! Parquet source module
//!
//! Reads a Parquet file as a lazy sequence of Arrow record batches.
//!
//! # Module Structure
//!
//! - `reader`: file handle, footer metadata and the single-pass batch stream

pub mod reader;

pub use reader::{BatchStream, ParquetSource};
