//! Error taxonomy for indexing and ranged reads.
//!
//! Decode problems are deliberately absent: a row that fails to decode is
//! returned lossily and counted in [`crate::reader::RowsRead::lossy_rows`].
//! Stale async results never become errors either; the dispatcher drops them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    /// The file could not be opened or scanned while building the index.
    #[error("cannot index {}: {source}", path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The requested start row has no offset in the index.
    #[error("row {row} is out of range (index has {total} rows)")]
    Seek { row: u64, total: u64 },

    /// Opening or seeking the file failed before any row was read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file on disk no longer matches the identity the index was built from.
    #[error("{} changed since it was indexed", path.display())]
    StaleIndex { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_error_message() {
        let e = ReaderError::Seek { row: 12, total: 10 };
        assert_eq!(e.to_string(), "row 12 is out of range (index has 10 rows)");
    }

    #[test]
    fn test_index_error_keeps_source() {
        use std::error::Error as _;
        let e = ReaderError::Index {
            path: PathBuf::from("/nope.csv"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(e.to_string().starts_with("cannot index /nope.csv"));
        assert!(e.source().is_some());
    }
}
