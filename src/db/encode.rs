//! Arrow to SQLite value encoding
//!
//! Each column of a batch is normalized once into one of a few array shapes
//! SQLite can bind directly (64-bit integers, doubles, UTF-8, bytes). Columns
//! with no native SQLite representation are rendered to text up front with
//! Arrow's display formatter. Rows are then bound without further dispatch.

use crate::error::{DbError, DbResult};
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BinaryViewArray, BooleanArray, FixedSizeBinaryArray,
    Float64Array, Int64Array, LargeBinaryArray, LargeStringArray, StringArray, StringBuilder,
    StringViewArray, UInt64Array,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, UInt64Type};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};

/// Column normalized for binding
enum Cells {
    /// `Null`-typed column: no buffers, every row is NULL
    Null,
    Int(Int64Array),
    UInt(UInt64Array),
    Bool(BooleanArray),
    Real(Float64Array),
    Text(StringArray),
    LargeText(LargeStringArray),
    TextView(StringViewArray),
    Bytes(BinaryArray),
    LargeBytes(LargeBinaryArray),
    BytesView(BinaryViewArray),
    FixedBytes(FixedSizeBinaryArray),
}

struct ColumnCells {
    name: String,
    cells: Cells,
}

/// Row-wise view over a record batch, producing SQLite bind values
pub struct BatchEncoder {
    columns: Vec<ColumnCells>,
    rows: usize,
}

impl BatchEncoder {
    pub fn new(batch: &RecordBatch) -> DbResult<Self> {
        let schema = batch.schema();
        let columns = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| {
                Ok(ColumnCells {
                    name: field.name().clone(),
                    cells: normalize(array, field.name())?,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(Self {
            columns,
            rows: batch.num_rows(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Fill `out` with the bind values of `row`, in column order
    pub fn row<'s>(&'s self, row: usize, out: &mut Vec<ToSqlOutput<'s>>) -> DbResult<()> {
        out.clear();
        for column in &self.columns {
            out.push(column.value(row)?);
        }
        Ok(())
    }
}

impl ColumnCells {
    fn value(&self, row: usize) -> DbResult<ToSqlOutput<'_>> {
        let is_null = match &self.cells {
            Cells::Null => true,
            Cells::Int(a) => a.is_null(row),
            Cells::UInt(a) => a.is_null(row),
            Cells::Bool(a) => a.is_null(row),
            Cells::Real(a) => a.is_null(row),
            Cells::Text(a) => a.is_null(row),
            Cells::LargeText(a) => a.is_null(row),
            Cells::TextView(a) => a.is_null(row),
            Cells::Bytes(a) => a.is_null(row),
            Cells::LargeBytes(a) => a.is_null(row),
            Cells::BytesView(a) => a.is_null(row),
            Cells::FixedBytes(a) => a.is_null(row),
        };
        if is_null {
            return Ok(ToSqlOutput::Owned(Value::Null));
        }

        let value = match &self.cells {
            Cells::Null => ToSqlOutput::Owned(Value::Null),
            Cells::Int(a) => ToSqlOutput::Owned(Value::Integer(a.value(row))),
            Cells::UInt(a) => {
                let v = a.value(row);
                let v = i64::try_from(v).map_err(|_| DbError::ValueOutOfRange {
                    column: self.name.clone(),
                    row,
                    reason: format!("{} exceeds the largest SQLite integer ({})", v, i64::MAX),
                })?;
                ToSqlOutput::Owned(Value::Integer(v))
            }
            Cells::Bool(a) => ToSqlOutput::Owned(Value::Integer(a.value(row) as i64)),
            Cells::Real(a) => ToSqlOutput::Owned(Value::Real(a.value(row))),
            Cells::Text(a) => ToSqlOutput::Borrowed(ValueRef::Text(a.value(row).as_bytes())),
            Cells::LargeText(a) => ToSqlOutput::Borrowed(ValueRef::Text(a.value(row).as_bytes())),
            Cells::TextView(a) => ToSqlOutput::Borrowed(ValueRef::Text(a.value(row).as_bytes())),
            Cells::Bytes(a) => ToSqlOutput::Borrowed(ValueRef::Blob(a.value(row))),
            Cells::LargeBytes(a) => ToSqlOutput::Borrowed(ValueRef::Blob(a.value(row))),
            Cells::BytesView(a) => ToSqlOutput::Borrowed(ValueRef::Blob(a.value(row))),
            Cells::FixedBytes(a) => ToSqlOutput::Borrowed(ValueRef::Blob(a.value(row))),
        };
        Ok(value)
    }
}

/// Convert one Arrow column into a bindable shape
fn normalize(array: &ArrayRef, column: &str) -> DbResult<Cells> {
    let cast_to = |to: &DataType| {
        cast(array.as_ref(), to).map_err(|source| DbError::Encode {
            column: column.to_string(),
            source,
        })
    };

    let cells = match array.data_type() {
        DataType::Null => Cells::Null,
        DataType::Int64 => Cells::Int(array.as_primitive::<Int64Type>().clone()),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => {
            Cells::Int(cast_to(&DataType::Int64)?.as_primitive::<Int64Type>().clone())
        }
        DataType::UInt64 => Cells::UInt(array.as_primitive::<UInt64Type>().clone()),
        DataType::Boolean => Cells::Bool(array.as_boolean().clone()),
        DataType::Float64 => Cells::Real(array.as_primitive::<Float64Type>().clone()),
        DataType::Float16
        | DataType::Float32
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => {
            Cells::Real(cast_to(&DataType::Float64)?.as_primitive::<Float64Type>().clone())
        }
        DataType::Utf8 => Cells::Text(array.as_string::<i32>().clone()),
        DataType::LargeUtf8 => Cells::LargeText(array.as_string::<i64>().clone()),
        DataType::Utf8View => Cells::TextView(array.as_string_view().clone()),
        DataType::Binary => Cells::Bytes(array.as_binary::<i32>().clone()),
        DataType::LargeBinary => Cells::LargeBytes(array.as_binary::<i64>().clone()),
        DataType::BinaryView => Cells::BytesView(array.as_binary_view().clone()),
        DataType::FixedSizeBinary(_) => Cells::FixedBytes(array.as_fixed_size_binary().clone()),
        DataType::Dictionary(_, value) => {
            let unpacked = cast_to(value.as_ref())?;
            normalize(&unpacked, column)?
        }
        _ => Cells::Text(render(array.as_ref(), column)?),
    };
    Ok(cells)
}

/// Render every value of a column to text with Arrow's display formatting
fn render(array: &dyn Array, column: &str) -> DbResult<StringArray> {
    let encode_err = |source| DbError::Encode {
        column: column.to_string(),
        source,
    };

    let options = FormatOptions::default();
    let formatter = ArrayFormatter::try_new(array, &options).map_err(encode_err)?;

    let mut builder = StringBuilder::with_capacity(array.len(), array.len() * 16);
    // Logical nulls also cover arrays without a validity buffer (null, run-end encoded).
    let nulls = array.logical_nulls();
    let mut buf = String::new();
    for row in 0..array.len() {
        if nulls.as_ref().is_some_and(|n| n.is_null(row)) {
            builder.append_null();
            continue;
        }
        buf.clear();
        formatter.value(row).write(&mut buf).map_err(encode_err)?;
        builder.append_value(&buf);
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        Date32Array, DictionaryArray, Float32Array, Int32Array, ListArray, NullArray,
        TimestampMicrosecondArray,
    };
    use arrow::datatypes::{Field, Int32Type, Schema};
    use std::sync::Arc;

    fn encode_all(batch: &RecordBatch) -> Vec<Vec<ToSqlOutput<'static>>> {
        let encoder = BatchEncoder::new(batch).unwrap();
        let mut rows = Vec::new();
        let mut buf = Vec::new();
        for row in 0..encoder.num_rows() {
            encoder.row(row, &mut buf).unwrap();
            rows.push(buf.iter().map(to_owned).collect());
        }
        rows
    }

    fn to_owned(out: &ToSqlOutput<'_>) -> ToSqlOutput<'static> {
        match out {
            ToSqlOutput::Borrowed(v) => ToSqlOutput::Owned(Value::from(*v)),
            ToSqlOutput::Owned(v) => ToSqlOutput::Owned(v.clone()),
            other => panic!("unexpected bind value {:?}", other),
        }
    }

    fn owned(v: Value) -> ToSqlOutput<'static> {
        ToSqlOutput::Owned(v)
    }

    #[test]
    fn test_native_types() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("i", DataType::Int32, true),
            Field::new("f", DataType::Float32, false),
            Field::new("b", DataType::Boolean, false),
            Field::new("s", DataType::Utf8, true),
            Field::new("raw", DataType::Binary, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![Some(7), None])),
                Arc::new(Float32Array::from(vec![1.5, -2.0])),
                Arc::new(BooleanArray::from(vec![true, false])),
                Arc::new(StringArray::from(vec![Some("გამარჯობა"), None])),
                Arc::new(BinaryArray::from(vec![b"ab".as_ref(), b"".as_ref()])),
            ],
        )
        .unwrap();

        let rows = encode_all(&batch);
        assert_eq!(
            rows[0],
            vec![
                owned(Value::Integer(7)),
                owned(Value::Real(1.5)),
                owned(Value::Integer(1)),
                owned(Value::Text("გამარჯობა".into())),
                owned(Value::Blob(b"ab".to_vec())),
            ]
        );
        assert_eq!(rows[1][0], owned(Value::Null));
        assert_eq!(rows[1][2], owned(Value::Integer(0)));
        assert_eq!(rows[1][3], owned(Value::Null));
    }

    #[test]
    fn test_uint64_overflow_is_reported() {
        let schema = Arc::new(Schema::new(vec![Field::new("big", DataType::UInt64, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(UInt64Array::from(vec![1, u64::MAX]))],
        )
        .unwrap();

        let encoder = BatchEncoder::new(&batch).unwrap();
        let mut buf = Vec::new();
        encoder.row(0, &mut buf).unwrap();
        assert_eq!(buf[0], owned(Value::Integer(1)));

        let err = encoder.row(1, &mut buf).unwrap_err();
        match err {
            DbError::ValueOutOfRange { column, row, .. } => {
                assert_eq!(column, "big");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_dictionary_is_unpacked() {
        let dict: DictionaryArray<Int32Type> =
            vec!["news", "blog", "news"].into_iter().collect();
        let schema = Arc::new(Schema::new(vec![Field::new(
            "category",
            dict.data_type().clone(),
            false,
        )]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(dict)]).unwrap();

        let rows = encode_all(&batch);
        assert_eq!(rows[2][0], owned(Value::Text("news".into())));
    }

    #[test]
    fn test_non_native_types_are_rendered() {
        let list = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![
            Some(vec![Some(1), Some(2)]),
            None,
        ]);
        let schema = Arc::new(Schema::new(vec![
            Field::new("day", DataType::Date32, false),
            Field::new(
                "at",
                DataType::Timestamp(arrow::datatypes::TimeUnit::Microsecond, None),
                false,
            ),
            Field::new("nums", list.data_type().clone(), true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Date32Array::from(vec![0, 1])),
                Arc::new(TimestampMicrosecondArray::from(vec![0, 1_000_000])),
                Arc::new(list),
            ],
        )
        .unwrap();

        let rows = encode_all(&batch);
        assert_eq!(rows[0][0], owned(Value::Text("1970-01-01".into())));
        match &rows[1][1] {
            ToSqlOutput::Owned(Value::Text(t)) => assert!(t.starts_with("1970-01-01T00:00:01")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rows[0][2], owned(Value::Text("[1, 2]".into())));
        assert_eq!(rows[1][2], owned(Value::Null));
    }

    #[test]
    fn test_null_typed_column_binds_null() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("note", DataType::Null, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(NullArray::new(3)),
            ],
        )
        .unwrap();

        let rows = encode_all(&batch);
        assert_eq!(rows.len(), 3);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row[0], owned(Value::Integer(i as i64 + 1)));
            assert_eq!(row[1], owned(Value::Null));
        }
    }

    #[test]
    fn test_render_respects_logical_nulls() {
        let rendered = render(&NullArray::new(2), "note").unwrap();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered.null_count(), 2);
    }
}
