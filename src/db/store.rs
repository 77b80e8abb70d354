//! SQLite destination store
//!
//! Owns the single connection of a conversion run. The table is created from
//! the first batch (dropping any previous table of the same name) and every
//! later batch is appended in its own transaction, so a batch is either
//! committed in full or not at all.
//!
//! # Performance Characteristics
//!
//! - One transaction per batch
//! - Cached prepared insert statement, values bound straight from Arrow buffers
//! - WAL journal, exclusive locking and `synchronous = OFF` while loading

use crate::db::encode::BatchEncoder;
use crate::db::schema::{self, TableSchema, FINISH_PRAGMAS, TABLE_NAME, WRITE_PRAGMAS};
use crate::error::{DbError, DbResult};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use rusqlite::{params_from_iter, Connection, Transaction};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Connection to the destination database
pub struct SqliteStore {
    conn: Option<Connection>,
    path: PathBuf,
    schema: Option<TableSchema>,
    rows_written: u64,
    batches_written: u64,
}

impl SqliteStore {
    /// Open (or create) the database file and apply bulk-load settings.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let path = path.as_ref();
        let connection_err = |source| DbError::Connection {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(connection_err)?;
        conn.execute_batch(WRITE_PRAGMAS).map_err(connection_err)?;
        debug!(path = %path.display(), "SQLite connection established");

        Ok(Self {
            conn: Some(conn),
            path: path.to_path_buf(),
            schema: None,
            rows_written: 0,
            batches_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frozen schema, once the table exists
    pub fn schema(&self) -> Option<&TableSchema> {
        self.schema.as_ref()
    }

    /// Rows committed by this store
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Batches committed by this store, including the first one
    pub fn batches_written(&self) -> u64 {
        self.batches_written
    }

    /// Replace the destination table with one shaped like `first`, then
    /// insert `first`'s rows.
    ///
    /// This is destructive: an existing `data_table` is dropped together
    /// with its rows and indexes. Drop, create and insert share one
    /// transaction, so a failure leaves the previous table untouched.
    pub fn create_table(&mut self, first: &RecordBatch) -> DbResult<usize> {
        let schema = TableSchema::infer(first.schema());
        self.replace_table(schema, Some(first))
    }

    /// Replace the destination table with an empty one shaped like `schema`.
    ///
    /// Used for sources without any rows, where no first batch exists.
    pub fn create_empty_table(&mut self, schema: SchemaRef) -> DbResult<()> {
        self.replace_table(TableSchema::infer(schema), None)?;
        Ok(())
    }

    fn replace_table(&mut self, schema: TableSchema, first: Option<&RecordBatch>) -> DbResult<usize> {
        if self.schema.is_some() {
            return Err(DbError::SchemaAlreadyCreated {
                table: TABLE_NAME.to_string(),
            });
        }
        let conn = self.conn.as_mut().ok_or(DbError::Closed)?;

        let tx = conn.transaction()?;
        tx.execute_batch(&schema::replace_table_sql(TABLE_NAME, &schema))?;
        let rows = match first {
            Some(batch) => insert_rows(&tx, &schema, batch)?,
            None => 0,
        };
        tx.commit()?;

        info!(table = TABLE_NAME, columns = %schema.describe(), "Created destination table");

        self.schema = Some(schema);
        self.rows_written += rows as u64;
        if first.is_some() {
            self.batches_written += 1;
        }
        Ok(rows)
    }

    /// Append a batch in its own transaction. Returns the rows written.
    pub fn append_batch(&mut self, batch: &RecordBatch) -> DbResult<usize> {
        let schema = self.schema.as_ref().ok_or_else(|| DbError::SchemaNotCreated {
            table: TABLE_NAME.to_string(),
        })?;
        if !schema.matches(&batch.schema()) {
            return Err(DbError::SchemaMismatch {
                expected: schema::describe_arrow(schema.arrow_schema()),
                found: schema::describe_arrow(&batch.schema()),
            });
        }
        let conn = self.conn.as_mut().ok_or(DbError::Closed)?;

        let tx = conn.transaction()?;
        let rows = insert_rows(&tx, schema, batch)?;
        tx.commit()?;

        self.rows_written += rows as u64;
        self.batches_written += 1;
        Ok(rows)
    }

    /// Check that `column` belongs to the frozen schema
    pub fn validate_column(&self, column: &str) -> DbResult<()> {
        let schema = self.schema.as_ref().ok_or_else(|| DbError::SchemaNotCreated {
            table: TABLE_NAME.to_string(),
        })?;
        if schema.contains(column) {
            Ok(())
        } else {
            Err(DbError::UnknownColumn {
                table: TABLE_NAME.to_string(),
                column: column.to_string(),
            })
        }
    }

    /// Create a single-column index named `idx_<lower-cased column>`.
    ///
    /// `None` is a no-op. The column must be part of the frozen schema; it
    /// is checked before any statement is built. Safe to repeat.
    pub fn create_index(&mut self, column: Option<&str>) -> DbResult<Option<String>> {
        let Some(column) = column else {
            info!("No index column specified, skipping index creation");
            return Ok(None);
        };
        self.validate_column(column)?;
        let conn = self.conn.as_mut().ok_or(DbError::Closed)?;

        info!("Creating index on {} column...", column);
        conn.execute_batch(&schema::create_index_sql(TABLE_NAME, column))?;

        let name = schema::index_name(column);
        info!(index = %name, "Index created successfully");
        Ok(Some(name))
    }

    /// Commit pending work and release the connection.
    pub fn close(mut self) -> DbResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        conn.execute_batch(FINISH_PRAGMAS)?;
        conn.close().map_err(|(_, e)| DbError::Sqlite(e))?;

        debug!(path = %self.path.display(), "SQLite connection closed");
        Ok(())
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            warn!(path = %self.path.display(), "SQLite connection released without close");
        }
    }
}

/// Insert every row of `batch` through the cached insert statement
fn insert_rows(tx: &Transaction<'_>, schema: &TableSchema, batch: &RecordBatch) -> DbResult<usize> {
    let encoder = BatchEncoder::new(batch)?;
    let mut stmt = tx.prepare_cached(&schema.insert_sql(TABLE_NAME))?;
    let mut values = Vec::with_capacity(encoder.num_columns());

    for row in 0..encoder.num_rows() {
        encoder.row(row, &mut values)?;
        stmt.execute(params_from_iter(values.iter()))?;
    }

    Ok(encoder.num_rows())
}
