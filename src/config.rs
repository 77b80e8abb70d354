//! Configuration types for parquet-to-sqlite
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::convert::ConvertOptions;
use crate::error::ConfigError;
use crate::sizer::{SizingMode, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE};
use clap::Parser;
use std::path::{Path, PathBuf};

/// Extension given to derived output paths
const DEFAULT_OUTPUT_EXTENSION: &str = "db";

/// Convert a Parquet file to a SQLite database
#[derive(Parser, Debug, Clone)]
#[command(
    name = "parquet-to-sqlite",
    version,
    about = "Convert a Parquet file to a SQLite database",
    long_about = "Streams a Parquet file into the table 'data_table' of a SQLite database.\n\n\
                  Rows are read in bounded chunks. When the process uses more than half of\n\
                  its memory target the chunk size is halved, never below --min-chunk-size.\n\
                  An existing 'data_table' in the output database is replaced.",
    after_help = "EXAMPLES:\n    \
        parquet-to-sqlite events.parquet\n    \
        parquet-to-sqlite events.parquet -o events.db -c 50000\n    \
        parquet-to-sqlite events.parquet --index-column domain --debug"
)]
pub struct CliArgs {
    /// Parquet file to convert
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output SQLite file (default: <input stem>.db)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Rows read and written per chunk
    #[arg(short = 'c', long, default_value_t = DEFAULT_CHUNK_SIZE, value_name = "NUM")]
    pub chunk_size: usize,

    /// Lower bound for memory-driven chunk size reductions
    #[arg(long, default_value_t = DEFAULT_MIN_CHUNK_SIZE, value_name = "NUM")]
    pub min_chunk_size: usize,

    /// Column to index after loading
    #[arg(short = 'i', long, value_name = "NAME")]
    pub index_column: Option<String>,

    /// Verbose output (debug logging, memory samples)
    #[arg(short = 'v', long, visible_alias = "debug")]
    pub verbose: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Re-check memory before every chunk instead of once after the first
    #[arg(long)]
    pub resize_every_batch: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Parquet input path
    pub input_path: PathBuf,

    /// SQLite output path
    pub output_path: PathBuf,

    pub chunk_size: usize,

    pub min_chunk_size: usize,

    pub index_column: Option<String>,

    pub sizing: SizingMode,

    /// Show progress bar and summary
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ConvertConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.input.as_os_str().is_empty() {
            return Err(ConfigError::InvalidInputPath {
                path: args.input,
                reason: "Path is empty".to_string(),
            });
        }

        if args.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize {
                name: "chunk size",
                size: args.chunk_size,
            });
        }
        if args.min_chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize {
                name: "minimum chunk size",
                size: args.min_chunk_size,
            });
        }

        let output_path = match args.output {
            Some(path) => path,
            None => default_output_path(&args.input)?,
        };

        // Validate output path
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidOutputPath {
                    path: output_path.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }
        if output_path == args.input {
            return Err(ConfigError::InvalidOutputPath {
                path: output_path,
                reason: "Output would overwrite the input file".to_string(),
            });
        }

        let sizing = if args.resize_every_batch {
            SizingMode::EveryBatch
        } else {
            SizingMode::Once
        };

        Ok(Self {
            input_path: args.input,
            output_path,
            chunk_size: args.chunk_size,
            min_chunk_size: args.min_chunk_size,
            index_column: args.index_column,
            sizing,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Pipeline options for this configuration
    pub fn to_options(&self) -> ConvertOptions {
        ConvertOptions::new(&self.input_path, &self.output_path)
            .with_chunk_size(self.chunk_size)
            .with_min_chunk_size(self.min_chunk_size)
            .with_index_column(self.index_column.clone())
            .with_sizing(self.sizing)
    }
}

/// `<input stem>.db` in the working directory
pub fn default_output_path(input: &Path) -> Result<PathBuf, ConfigError> {
    let stem = input
        .file_stem()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::InvalidInputPath {
            path: input.to_path_buf(),
            reason: "Cannot derive an output name from this path".to_string(),
        })?;
    Ok(PathBuf::from(stem).with_extension(DEFAULT_OUTPUT_EXTENSION))
}
