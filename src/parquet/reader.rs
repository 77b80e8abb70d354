//! Bounded batch reader over a Parquet file
//!
//! [`ParquetSource`] opens a file and reads its row count from the footer.
//! [`ParquetSource::batches`] hands out a single-pass [`BatchStream`]; asking
//! for a second stream fails, since the decoder cannot be rewound.

use crate::error::{SourceError, SourceResult};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An opened Parquet file
pub struct ParquetSource {
    path: PathBuf,
    total_rows: u64,
    schema: SchemaRef,
    builder: Option<ParquetRecordBatchReaderBuilder<File>>,
}

impl ParquetSource {
    /// Open a Parquet file and read its metadata.
    ///
    /// Fails with [`SourceError::NotFound`] when `path` does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> SourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SourceError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| SourceError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;

        let metadata = builder.metadata();
        let total_rows = metadata.file_metadata().num_rows().max(0) as u64;
        let row_groups = metadata.num_row_groups();
        let schema = builder.schema().clone();

        debug!(
            path = %path.display(),
            total_rows,
            row_groups,
            columns = schema.fields().len(),
            "Opened Parquet source"
        );

        Ok(Self {
            path: path.to_path_buf(),
            total_rows,
            schema,
            builder: Some(builder),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Row count from the file footer; fixed for the handle's lifetime
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Arrow schema of the file
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Start the single pass over the file's rows in batches of at most
    /// `batch_size` rows.
    pub fn batches(&mut self, batch_size: usize) -> SourceResult<BatchStream> {
        if batch_size == 0 {
            return Err(SourceError::InvalidBatchSize { size: batch_size });
        }
        let builder = self.builder.take().ok_or(SourceError::AlreadyConsumed)?;
        let reader = builder.with_batch_size(batch_size).build()?;

        Ok(BatchStream {
            path: self.path.clone(),
            reader,
            decoder_batch_size: batch_size,
            pending: None,
            batch_size,
            total_rows: self.total_rows,
            rows_delivered: 0,
            exhausted: false,
        })
    }
}

/// Forward-only sequence of record batches.
///
/// Every yielded batch has exactly `batch_size` rows except the last, which
/// has between 1 and `batch_size`. When the decoder is drained the stream
/// checks that it delivered exactly the footer's row count, and yields
/// [`SourceError::RowCountMismatch`] otherwise. After the end or any error
/// the stream stays exhausted.
pub struct BatchStream {
    path: PathBuf,
    reader: ParquetRecordBatchReader,
    decoder_batch_size: usize,
    pending: Option<RecordBatch>,
    batch_size: usize,
    total_rows: u64,
    rows_delivered: u64,
    exhausted: bool,
}

impl BatchStream {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Lower the size of subsequent batches. Larger values are ignored.
    ///
    /// Rows already decoded are re-cut to the new size. The decoder itself is
    /// rebuilt at the new size before the next read, positioned after the
    /// last decoded row, so later reads decode no more than `batch_size`
    /// rows at a time.
    pub fn shrink_batch_size(&mut self, batch_size: usize) {
        if batch_size > 0 && batch_size < self.batch_size {
            self.batch_size = batch_size;
        }
    }

    pub fn rows_delivered(&self) -> u64 {
        self.rows_delivered
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Reopen the file with a decoder at the current batch size, skipping
    /// every row that was already decoded.
    fn rebuild_decoder(&mut self) -> SourceResult<()> {
        let pending_rows = self.pending.as_ref().map_or(0, |b| b.num_rows());
        let offset = self.rows_delivered as usize + pending_rows;

        let file = File::open(&self.path)?;
        self.reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(self.batch_size)
            .with_offset(offset)
            .build()?;
        self.decoder_batch_size = self.batch_size;

        debug!(batch_size = self.batch_size, offset, "Rebuilt Parquet decoder");
        Ok(())
    }

    fn deliver(&mut self, batch: RecordBatch) -> Option<SourceResult<RecordBatch>> {
        self.rows_delivered += batch.num_rows() as u64;
        Some(Ok(batch))
    }

    fn fail(&mut self, err: SourceError) -> Option<SourceResult<RecordBatch>> {
        self.exhausted = true;
        self.pending = None;
        Some(Err(err))
    }
}

impl Iterator for BatchStream {
    type Item = SourceResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        loop {
            let pending_rows = self.pending.as_ref().map_or(0, |b| b.num_rows());
            if pending_rows >= self.batch_size {
                if let Some(batch) = self.pending.take() {
                    let head = batch.slice(0, self.batch_size);
                    if pending_rows > self.batch_size {
                        let rest = batch.slice(self.batch_size, pending_rows - self.batch_size);
                        self.pending = Some(rest);
                    }
                    return self.deliver(head);
                }
            }

            if self.decoder_batch_size > self.batch_size {
                if let Err(e) = self.rebuild_decoder() {
                    return self.fail(e);
                }
            }

            match self.reader.next() {
                Some(Ok(batch)) => match self.pending.take() {
                    // Top up a remainder left by a shrink so only the last batch runs short.
                    Some(rest) if rest.num_rows() > 0 => {
                        match concat_batches(&batch.schema(), [&rest, &batch]) {
                            Ok(joined) => self.pending = Some(joined),
                            Err(e) => return self.fail(e.into()),
                        }
                    }
                    _ => self.pending = Some(batch),
                },
                Some(Err(e)) => return self.fail(e.into()),
                None => {
                    if let Some(rest) = self.pending.take().filter(|b| b.num_rows() > 0) {
                        return self.deliver(rest);
                    }
                    if self.rows_delivered != self.total_rows {
                        return self.fail(SourceError::RowCountMismatch {
                            expected: self.total_rows,
                            delivered: self.rows_delivered,
                        });
                    }
                    self.exhausted = true;
                    return None;
                }
            }
        }
    }
}

impl std::iter::FusedIterator for BatchStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use parquet::file::properties::WriterProperties;
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Write `rows` rows split into row groups of `group_size`.
    fn write_numbers(path: &Path, rows: i64, group_size: usize) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("n", DataType::Int64, false),
            Field::new("label", DataType::Utf8, true),
        ]));
        let props = WriterProperties::builder()
            .set_max_row_group_size(group_size)
            .build();
        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props)).unwrap();

        let values: Vec<i64> = (0..rows).collect();
        let labels: Vec<Option<String>> = values
            .iter()
            .map(|v| if v % 3 == 0 { None } else { Some(format!("row-{}", v)) })
            .collect();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(values)),
            Arc::new(StringArray::from(labels)),
        ];
        let batch = RecordBatch::try_new(schema, columns).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn collect_values(stream: BatchStream) -> Vec<i64> {
        let mut out = Vec::new();
        for batch in stream {
            let batch = batch.unwrap();
            let col = batch
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap();
            out.extend(col.values().iter().copied());
        }
        out
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let err = ParquetSource::open(dir.path().join("nope.parquet")).err().unwrap();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    #[test]
    fn test_open_rejects_non_parquet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.parquet");
        std::fs::write(&path, b"definitely not parquet").unwrap();
        let err = ParquetSource::open(&path).err().unwrap();
        assert!(matches!(err, SourceError::Open { .. }));
    }

    #[test]
    fn test_rows_delivered_match_total_for_many_sizes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("numbers.parquet");
        write_numbers(&path, 1_037, 250);

        for size in [1, 7, 100, 250, 1_000, 5_000] {
            let mut source = ParquetSource::open(&path).unwrap();
            assert_eq!(source.total_rows(), 1_037);

            let mut stream = source.batches(size).unwrap();
            let mut sum = 0u64;
            let mut count = 0;
            for batch in stream.by_ref() {
                let rows = batch.unwrap().num_rows();
                assert!(rows >= 1 && rows <= size, "size {} gave {} rows", size, rows);
                sum += rows as u64;
                count += 1;
            }
            assert_eq!(sum, 1_037, "batch size {}", size);
            assert_eq!(stream.rows_delivered(), 1_037);
            assert!(count >= 1_037usize.div_ceil(size));
            assert!(stream.is_exhausted());
        }
    }

    #[test]
    fn test_order_is_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("numbers.parquet");
        write_numbers(&path, 500, 128);

        let mut source = ParquetSource::open(&path).unwrap();
        let values = collect_values(source.batches(33).unwrap());
        assert_eq!(values, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_second_pass_fails_loudly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("numbers.parquet");
        write_numbers(&path, 10, 10);

        let mut source = ParquetSource::open(&path).unwrap();
        let stream = source.batches(4).unwrap();
        assert_eq!(collect_values(stream).len(), 10);
        assert!(matches!(
            source.batches(4).err().unwrap(),
            SourceError::AlreadyConsumed
        ));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("numbers.parquet");
        write_numbers(&path, 10, 10);

        let mut source = ParquetSource::open(&path).unwrap();
        assert!(matches!(
            source.batches(0).err().unwrap(),
            SourceError::InvalidBatchSize { size: 0 }
        ));
        // The handle is still usable after a rejected request.
        assert!(source.batches(5).is_ok());
    }

    #[test]
    fn test_shrink_mid_stream_loses_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("numbers.parquet");
        write_numbers(&path, 1_000, 1_000);

        let mut source = ParquetSource::open(&path).unwrap();
        let mut stream = source.batches(400).unwrap();

        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.num_rows(), 400);

        stream.shrink_batch_size(150);
        stream.shrink_batch_size(10_000); // ignored
        assert_eq!(stream.batch_size(), 150);

        let mut sizes = vec![first.num_rows()];
        let mut values: Vec<i64> = first
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec();
        for batch in stream {
            let batch = batch.unwrap();
            sizes.push(batch.num_rows());
            let col = batch
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap();
            values.extend(col.values().iter().copied());
        }

        assert_eq!(sizes, vec![400, 150, 150, 150, 150]);
        assert_eq!(values, (0..1_000).collect::<Vec<_>>());
    }

    #[test]
    fn test_shrink_rebuilds_decoder_at_new_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("numbers.parquet");
        write_numbers(&path, 2_000, 2_000);

        let mut source = ParquetSource::open(&path).unwrap();
        let mut stream = source.batches(800).unwrap();
        assert_eq!(stream.next().unwrap().unwrap().num_rows(), 800);

        stream.shrink_batch_size(300);
        let mut values = Vec::new();
        let mut sizes = Vec::new();
        while let Some(batch) = stream.next() {
            let batch = batch.unwrap();
            assert_eq!(stream.decoder_batch_size, 300);
            sizes.push(batch.num_rows());
            let col = batch
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap();
            values.extend(col.values().iter().copied());
        }

        assert_eq!(sizes, vec![300, 300, 300, 300]);
        assert_eq!(values, (800..2_000).collect::<Vec<_>>());
        assert_eq!(stream.rows_delivered(), 2_000);
    }

    #[test]
    fn test_empty_file_yields_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        write_numbers(&path, 0, 10);

        let mut source = ParquetSource::open(&path).unwrap();
        assert_eq!(source.total_rows(), 0);
        assert_eq!(source.schema().fields().len(), 2);

        let mut stream = source.batches(10).unwrap();
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }
}
