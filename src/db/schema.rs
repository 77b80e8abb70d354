//! Destination table schema and statement builders
//!
//! The table schema is inferred once from the Arrow schema of the first
//! batch and then frozen. Declared types use the usual SQLite affinities:
//! integers and booleans are `INTEGER`, floats and decimals `REAL`, binary
//! `BLOB`, temporal types keep their own names, everything else is `TEXT`.

use crate::error::DbResult;
use arrow::datatypes::{DataType, Schema, SchemaRef};
use rusqlite::Connection;

/// Name of the single destination table
pub const TABLE_NAME: &str = "data_table";

/// SQLite pragmas for bulk loading
pub const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = OFF;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
PRAGMA locking_mode = EXCLUSIVE;
"#;

/// Pragmas applied before the connection is released
pub const FINISH_PRAGMAS: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA locking_mode = NORMAL;
"#;

/// Declared column type in the destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
    Timestamp,
    Date,
    Time,
}

impl SqlType {
    /// Map an Arrow type to the declared SQLite type.
    ///
    /// Types without a natural SQLite equivalent (lists, structs, maps,
    /// durations, intervals) are stored as their text rendering.
    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => SqlType::Integer,
            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => SqlType::Real,
            DataType::Binary
            | DataType::LargeBinary
            | DataType::BinaryView
            | DataType::FixedSizeBinary(_) => SqlType::Blob,
            DataType::Timestamp(_, _) => SqlType::Timestamp,
            DataType::Date32 | DataType::Date64 => SqlType::Date,
            DataType::Time32(_) | DataType::Time64(_) => SqlType::Time,
            DataType::Dictionary(_, value) => SqlType::from_arrow(value),
            _ => SqlType::Text,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
        }
    }
}

/// One destination column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
}

/// Frozen, ordered column list of the destination table
#[derive(Debug, Clone)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
    arrow: SchemaRef,
}

impl TableSchema {
    /// Infer the table schema from an Arrow schema
    pub fn infer(arrow: SchemaRef) -> Self {
        let columns = arrow
            .fields()
            .iter()
            .map(|f| ColumnDef {
                name: f.name().clone(),
                sql_type: SqlType::from_arrow(f.data_type()),
            })
            .collect();
        Self { columns, arrow }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Exact, case-sensitive membership test
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    /// Arrow schema the table was inferred from
    pub fn arrow_schema(&self) -> &SchemaRef {
        &self.arrow
    }

    /// True when `other` has the same column names and Arrow types in the
    /// same order. Nullability and metadata are not compared.
    pub fn matches(&self, other: &Schema) -> bool {
        let ours = self.arrow.fields();
        let theirs = other.fields();
        ours.len() == theirs.len()
            && ours
                .iter()
                .zip(theirs.iter())
                .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type())
    }

    /// Human-readable `name TYPE, ...` list
    pub fn describe(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type.as_sql()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `CREATE TABLE` statement for this schema
    pub fn create_table_sql(&self, table: &str) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({})", quote_ident(table), columns)
    }

    /// Positional `INSERT` statement binding every column in schema order
    pub fn insert_sql(&self, table: &str) -> String {
        let names = self
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=self.columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            names,
            placeholders
        )
    }
}

/// Describe an Arrow schema the same way [`TableSchema::describe`] does
pub fn describe_arrow(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{} {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Deterministic index name for a column: `idx_<lower-cased column>`
pub fn index_name(column: &str) -> String {
    format!("idx_{}", column.to_lowercase())
}

/// Idempotent single-column index statement.
///
/// Identifiers cannot be bound as parameters, so `column` must already be
/// checked against the frozen schema; it is quoted here as well.
pub fn create_index_sql(table: &str, column: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(&index_name(column)),
        quote_ident(table),
        quote_ident(column)
    )
}

/// Drop-and-recreate statements for the destination table
pub fn replace_table_sql(table: &str, schema: &TableSchema) -> String {
    format!(
        "DROP TABLE IF EXISTS {};\n{};",
        quote_ident(table),
        schema.create_table_sql(table)
    )
}

/// Column names and declared types of an existing table, in order.
///
/// Returns an empty list when the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt
        .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of rows in a table
pub fn row_count(conn: &Connection, table: &str) -> DbResult<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// Names of indexes defined on a table
pub fn table_indexes(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
