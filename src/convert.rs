//! Parquet to SQLite conversion
//!
//! Streams a Parquet file into the `data_table` table of a SQLite database
//! one bounded batch at a time.
//!
//! # Run lifecycle
//!
//! ```text
//! Idle -> Opened -> SchemaEstablished -> Streaming -> Indexing -> Closed
//!   \________\___________\___________________\___________\-> Failed
//! ```
//!
//! - **Opened**: source opened first (a missing input never creates an
//!   output file), the index column checked against the file schema, then
//!   the destination.
//! - **SchemaEstablished**: the first batch is read, the chunk size is
//!   adjusted for memory pressure, and the table is replaced using that
//!   batch's schema.
//! - **Streaming**: remaining batches are appended in source order, one
//!   transaction each. The first failing batch aborts the run; batches
//!   already committed stay in the table.
//! - **Indexing**: the optional index is created.
//! - **Closed**: the destination is released. Release also happens on every
//!   failure path once the destination was opened.
//!
//! There is no cancellation. Killing the process mid-run leaves a partially
//! populated table; rerun the conversion to replace it.

use crate::db::{SqliteStore, TableSchema, TABLE_NAME};
use crate::error::{ConvertError, DbError, Result};
use crate::memory::{MemoryProbe, SystemMemory};
use crate::parquet::{BatchStream, ParquetSource};
use crate::progress::format_number;
use crate::sizer::{BatchSizeState, SizingMode, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Progress callback type, called with `(rows_written, total_rows)`
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send>;

/// Parameters of one conversion run
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Parquet file to read
    pub input: PathBuf,
    /// SQLite file to write
    pub output: PathBuf,
    /// Requested rows per batch
    pub chunk_size: usize,
    /// Floor for memory-driven reductions
    pub min_chunk_size: usize,
    /// Column to index after loading
    pub index_column: Option<String>,
    /// When the sizing policy runs
    pub sizing: SizingMode,
}

impl ConvertOptions {
    pub fn new<P1, P2>(input: P1, output: P2) -> Self
    where
        P1: AsRef<Path>,
        P2: AsRef<Path>,
    {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            index_column: None,
            sizing: SizingMode::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size;
        self
    }

    pub fn with_index_column<S: Into<String>>(mut self, column: Option<S>) -> Self {
        self.index_column = column.map(Into::into);
        self
    }

    pub fn with_sizing(mut self, sizing: SizingMode) -> Self {
        self.sizing = sizing;
        self
    }
}

/// Pipeline state, see the module docs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertState {
    Idle,
    Opened,
    SchemaEstablished,
    Streaming,
    Indexing,
    Closed,
    Failed,
}

/// Statistics from a conversion
#[derive(Debug, Clone, Default)]
pub struct ConvertStats {
    /// Row count from the Parquet footer
    pub total_rows: u64,
    /// Rows committed to the destination
    pub rows_written: u64,
    /// Batches committed, including the first one
    pub batches_written: u64,
    pub initial_chunk_size: usize,
    pub final_chunk_size: usize,
    pub chunk_size_reductions: u32,
    /// Name of the index created, if any
    pub index_name: Option<String>,
    pub duration: Duration,
}

/// Drives one Parquet to SQLite conversion
pub struct Converter {
    options: ConvertOptions,
    progress: Option<ProgressCallback>,
    state: ConvertState,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self {
            options,
            progress: None,
            state: ConvertState::Idle,
        }
    }

    /// Report `(rows_written, total_rows)` after every committed batch
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// State reached by the last run
    pub fn state(&self) -> ConvertState {
        self.state
    }

    /// Run the conversion, sampling memory from the live system
    pub fn run(&mut self) -> Result<ConvertStats> {
        let mut probe = SystemMemory::new();
        self.run_with_probe(&mut probe)
    }

    /// Run the conversion with an explicit memory probe
    pub fn run_with_probe(&mut self, probe: &mut dyn MemoryProbe) -> Result<ConvertStats> {
        let started = Instant::now();
        self.state = ConvertState::Idle;
        info!("Starting conversion of {}", self.options.input.display());

        match self.execute(probe) {
            Ok(mut stats) => {
                stats.duration = started.elapsed();
                info!(
                    rows = stats.rows_written,
                    batches = stats.batches_written,
                    chunk_size = stats.final_chunk_size,
                    elapsed_ms = stats.duration.as_millis() as u64,
                    "Conversion completed successfully"
                );
                Ok(stats)
            }
            Err(e) => {
                self.transition(ConvertState::Failed);
                error!("Conversion failed: {}", e);
                Err(e)
            }
        }
    }

    fn execute(&mut self, probe: &mut dyn MemoryProbe) -> Result<ConvertStats> {
        let mut source = ParquetSource::open(&self.options.input)?;
        self.check_index_column(&source)?;
        let mut store = SqliteStore::open(&self.options.output)?;
        self.transition(ConvertState::Opened);

        let mut stats = ConvertStats::default();
        let outcome = self.load(&mut source, &mut store, probe, &mut stats);

        // The destination is released whatever happened above.
        let closed = store.close();
        match (outcome, closed) {
            (Ok(()), Ok(())) => {
                self.transition(ConvertState::Closed);
                Ok(stats)
            }
            (Ok(()), Err(e)) => Err(ConvertError::Database(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                error!(error = %close_err, "Failed to close database after error");
                Err(e)
            }
        }
    }

    fn load(
        &mut self,
        source: &mut ParquetSource,
        store: &mut SqliteStore,
        probe: &mut dyn MemoryProbe,
        stats: &mut ConvertStats,
    ) -> Result<()> {
        let total_rows = source.total_rows();
        stats.total_rows = total_rows;
        info!(total_rows, "Found {} rows in Parquet file", format_number(total_rows));

        let mut sizing = BatchSizeState::new(self.options.chunk_size, self.options.min_chunk_size);
        stats.initial_chunk_size = sizing.current();
        let mut batches = source.batches(sizing.current())?;

        let first = batches.next().transpose()?;
        resize(&mut sizing, &mut batches, probe);

        match first {
            Some(first) => {
                let rows = store
                    .create_table(&first)
                    .map_err(|source| write_failed(1, source))?;
                stats.rows_written += rows as u64;
                stats.batches_written += 1;
                self.report_progress(stats.rows_written, total_rows);
            }
            None => {
                debug!("Source has no rows, creating empty table");
                store.create_empty_table(source.schema())?;
            }
        }
        self.transition(ConvertState::SchemaEstablished);

        self.transition(ConvertState::Streaming);
        while let Some(batch) = batches.next().transpose()? {
            let batch_number = stats.batches_written + 1;
            let rows = store
                .append_batch(&batch)
                .map_err(|source| write_failed(batch_number, source))?;
            drop(batch);

            stats.rows_written += rows as u64;
            stats.batches_written += 1;
            self.report_progress(stats.rows_written, total_rows);

            // Sizing for the next read
            match self.options.sizing {
                SizingMode::EveryBatch => resize(&mut sizing, &mut batches, probe),
                SizingMode::Once => {
                    let snapshot = probe.sample();
                    debug!("Memory usage: {:.2}MB", snapshot.process_mb);
                }
            }
        }

        stats.final_chunk_size = sizing.current();
        stats.chunk_size_reductions = sizing.reductions();

        self.transition(ConvertState::Indexing);
        stats.index_name = store
            .create_index(self.options.index_column.as_deref())
            .map_err(|source| {
                let column = self.options.index_column.clone().unwrap_or_default();
                error!("Failed to create index: {}", source);
                ConvertError::Index { column, source }
            })?;

        Ok(())
    }

    /// Reject an index column missing from the file schema before the
    /// destination is opened, so a bad name never replaces existing data.
    fn check_index_column(&self, source: &ParquetSource) -> Result<()> {
        let Some(column) = self.options.index_column.as_deref() else {
            return Ok(());
        };
        if TableSchema::infer(source.schema()).contains(column) {
            return Ok(());
        }
        Err(ConvertError::Index {
            column: column.to_string(),
            source: DbError::UnknownColumn {
                table: TABLE_NAME.to_string(),
                column: column.to_string(),
            },
        })
    }

    fn transition(&mut self, next: ConvertState) {
        debug!(from = ?self.state, to = ?next, "Conversion state change");
        self.state = next;
    }

    fn report_progress(&self, rows_written: u64, total_rows: u64) {
        if let Some(ref callback) = self.progress {
            callback(rows_written, total_rows);
        }
    }
}

/// Sample memory and shrink the batch size if the policy says so
fn resize(sizing: &mut BatchSizeState, batches: &mut BatchStream, probe: &mut dyn MemoryProbe) {
    let snapshot = probe.sample();
    debug!(
        "Available memory: {:.2}MB, Current usage: {:.2}MB",
        snapshot.available_mb, snapshot.process_mb
    );
    if let Some(reduced) = sizing.apply(&snapshot) {
        batches.shrink_batch_size(reduced);
        info!("Reduced chunk size to {} due to memory constraints", reduced);
    }
}

fn write_failed(batch: u64, source: crate::error::DbError) -> ConvertError {
    error!(batch, "Error processing chunk: {}", source);
    ConvertError::Write { batch, source }
}

/// Convert a Parquet file to SQLite using the live memory probe
pub fn convert_parquet_to_sqlite(
    options: ConvertOptions,
    progress_callback: Option<ProgressCallback>,
) -> Result<ConvertStats> {
    let mut converter = Converter::new(options);
    if let Some(callback) = progress_callback {
        converter = converter.with_progress(callback);
    }
    converter.run()
}
