//! Ranged reads: decode `[start_row, start_row + count)` using a [`FileIndex`].

use std::fs::File;
use std::io;
use std::time::Instant;

use csv::ByteRecord;
use log::{debug, trace, warn};

use crate::error::{ReaderError, Result};
use crate::index::FileIndex;
use crate::parse;
use crate::perf::Timing;

const READ_BUFFER: usize = 16 * 1024;

/// One decoded row: its fields in file order.
pub type Row = Vec<String>;

/// Contiguous decoded rows starting at index row `start_row`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSlice {
    pub start_row: u64,
    pub rows: Vec<Row>,
}

impl RowSlice {
    pub fn new(start_row: u64, rows: Vec<Row>) -> Self {
        Self { start_row, rows }
    }

    pub fn empty(start_row: u64) -> Self {
        Self::new(start_row, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index row one past the last row in the slice.
    pub fn end_row(&self) -> u64 {
        self.start_row + self.rows.len() as u64
    }
}

/// Outcome of one ranged read.
#[derive(Debug)]
pub struct RowsRead {
    pub slice: RowSlice,
    /// Rows that contained bytes invalid in the file's encoding and were
    /// decoded with replacement characters.
    pub lossy_rows: usize,
    /// An I/O error cut the read short; `slice` holds the rows read before it.
    pub truncated: bool,
    pub timing: Timing,
}

/// Read up to `row_count` rows starting at index row `start_row`.
///
/// Returns fewer rows at end of file. The file is opened and closed per
/// call, so concurrent calls never share a handle.
pub fn read_rows(index: &FileIndex, start_row: u64, row_count: usize) -> Result<RowsRead> {
    let start = Instant::now();
    let operation = format!(
        "rows {}-{}",
        start_row,
        start_row + (row_count as u64).saturating_sub(1)
    );

    let total = index.total_row_count();
    if start_row >= total {
        return Err(ReaderError::Seek {
            row: start_row,
            total,
        });
    }
    let offset = index.offset(start_row).ok_or(ReaderError::Seek {
        row: start_row,
        total,
    })?;

    let path = index.path();
    if !index.identity().still_matches(path) {
        return Err(ReaderError::StaleIndex {
            path: path.to_path_buf(),
        });
    }
    let read_err = |source| ReaderError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_err)?;
    let delimiter = index.delimiter();
    let mut reader = parse::reader_at(file, delimiter, offset, READ_BUFFER)
        .map_err(|e| read_err(io::Error::from(e)))?;

    let enc = index.encoding();
    let mut rows = Vec::with_capacity(row_count);
    let mut record = ByteRecord::new();
    let mut lossy_rows = 0;
    let mut truncated = false;

    while rows.len() < row_count {
        match reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) => {
                warn!(
                    "read: {} failed after {} rows at row {}: {e}",
                    path.display(),
                    rows.len(),
                    start_row + rows.len() as u64
                );
                truncated = true;
                break;
            }
        }
        let row_no = start_row + rows.len() as u64;
        let (fields, lossy) = parse::decode_record(&record, enc, row_no == 0);
        if lossy {
            lossy_rows += 1;
            debug!("read: row {row_no} is not valid {enc}, decoded lossily");
        }
        trace!("read: row {row_no}: {} fields", fields.len());
        rows.push(fields);
    }

    let timing = Timing::since(operation, start);
    debug!(
        "read: {} rows from {} in {:.1}ms (requested {row_count}, lossy={lossy_rows})",
        rows.len(),
        start_row,
        timing.millis()
    );

    Ok(RowsRead {
        slice: RowSlice::new(start_row, rows),
        lossy_rows,
        truncated,
        timing,
    })
}
