//! Line-position index: byte offset of every row in a delimited file.
//!
//! Row numbering used throughout the crate:
//!
//! ```text
//! index row   0        1        2      ...   total_rows-1
//!             header   data 0   data 1 ...
//! ```
//!
//! Index rows are 0-based and include the header. Data rows are 0-based and
//! exclude it. [`index_row_to_data_row`] and [`data_row_to_index_row`] are the
//! only places that translate between the two.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use csv::ByteRecord;
use log::{debug, info};

use crate::encoding::{self, Encoding, EncodingChoice, SAMPLE_LIMIT};
use crate::error::{ReaderError, Result};
use crate::parse::{self, Delimiter};
use crate::perf::Timing;

const READ_BUFFER: usize = 64 * 1024;

/// First physical line of a sample, without BOM or terminator.
fn first_line(sample: &[u8]) -> &[u8] {
    let line = encoding::strip_bom(sample);
    let line = line.split(|&b| b == b'\n').next().unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Index row of the first data row.
pub const FIRST_DATA_ROW: u64 = 1;

pub fn index_row_to_data_row(index_row: u64) -> Option<u64> {
    index_row.checked_sub(FIRST_DATA_ROW)
}

pub fn data_row_to_index_row(data_row: u64) -> u64 {
    data_row + FIRST_DATA_ROW
}

/// Coarse identity of a file on disk: path, size and modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileIdentity {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    /// True if `path` still names this file with the same size and mtime.
    pub fn still_matches(&self, path: &Path) -> bool {
        if self.path != path {
            return false;
        }
        match Self::of(path) {
            Ok(now) => now == *self,
            Err(_) => false,
        }
    }
}

/// User-supplied knobs for indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexOptions {
    pub encoding: EncodingChoice,
    pub delimiter: Option<Delimiter>,
}

/// Byte offsets of every row, plus the decoded header.
#[derive(Debug, Clone)]
pub struct FileIndex {
    identity: FileIdentity,
    options: IndexOptions,
    /// `offsets[row]` is where index row `row` starts.
    offsets: Vec<u64>,
    header: Vec<String>,
    encoding: Encoding,
    delimiter: Delimiter,
}

impl FileIndex {
    /// Scan `path` once and record where every row starts.
    ///
    /// Only the header is decoded; data rows are decoded on read.
    pub fn build(path: &Path, options: IndexOptions) -> Result<(Self, Timing)> {
        let start = Instant::now();
        let index_err = |source| ReaderError::Index {
            path: path.to_path_buf(),
            source,
        };

        let identity = FileIdentity::of(path).map_err(index_err)?;
        let mut file = File::open(path).map_err(index_err)?;

        let mut sample = Vec::new();
        (&mut file)
            .take(SAMPLE_LIMIT as u64)
            .read_to_end(&mut sample)
            .map_err(index_err)?;
        let sample_is_prefix = (sample.len() as u64) < identity.len;
        let encoding = options.encoding.resolve(&sample, sample_is_prefix);
        debug!(
            "index: {} sample={} bytes, encoding={} ({})",
            path.display(),
            sample.len(),
            encoding,
            options.encoding
        );

        let delimiter = options
            .delimiter
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .and_then(Delimiter::from_extension)
            })
            .unwrap_or_else(|| parse::detect_delimiter(first_line(&sample)));
        drop(sample);

        let csv_err = |e: csv::Error| index_err(io::Error::from(e));
        let mut reader = parse::reader_at(file, delimiter, 0, READ_BUFFER).map_err(csv_err)?;
        let mut record = ByteRecord::new();
        let mut offsets = Vec::new();
        let mut header = Vec::new();

        loop {
            let pos = reader.position().byte();
            if !reader.read_byte_record(&mut record).map_err(csv_err)? {
                break;
            }
            if offsets.is_empty() {
                header = parse::decode_record(&record, encoding, true).0;
            }
            offsets.push(pos);
        }

        let timing = Timing::since("index", start);
        info!(
            "index: {} completed in {:.1}ms ({} rows, {} columns, encoding={}, delimiter={})",
            path.display(),
            timing.millis(),
            offsets.len(),
            header.len(),
            encoding,
            delimiter
        );

        Ok((
            Self {
                identity,
                options,
                offsets,
                header,
                encoding,
                delimiter,
            },
            timing,
        ))
    }

    /// Whether a request for `path` with `options` can reuse this index.
    pub fn is_current_for(&self, path: &Path, options: IndexOptions) -> bool {
        self.options == options && self.identity.still_matches(path)
    }

    pub fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    pub fn path(&self) -> &Path {
        &self.identity.path
    }

    /// Header + data rows.
    pub fn total_row_count(&self) -> u64 {
        self.offsets.len() as u64
    }

    pub fn data_row_count(&self) -> u64 {
        self.total_row_count().saturating_sub(FIRST_DATA_ROW)
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Byte offset where index row `row` starts.
    pub fn offset(&self, row: u64) -> Option<u64> {
        usize::try_from(row)
            .ok()
            .and_then(|r| self.offsets.get(r))
            .copied()
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }
}
