#![no_main]

use std::io::Write;

use libfuzzer_sys::fuzz_target;
use rowscope::index::{FileIndex, IndexOptions};
use rowscope::reader::read_rows;

fuzz_target!(|data: &[u8]| {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(data).expect("write temp file");
    file.flush().expect("flush temp file");

    let (index, _) = FileIndex::build(file.path(), IndexOptions::default()).expect("index");
    let total = index.total_row_count();

    // Offsets start at 0, strictly increase and stay inside the file.
    let mut prev = None;
    for row in 0..total {
        let off = index.offset(row).expect("every row has an offset");
        assert!(off < data.len() as u64);
        if let Some(p) = prev {
            assert!(off > p, "offset {off} after {p}");
        } else {
            assert_eq!(off, 0);
        }
        prev = Some(off);
    }
    assert!(index.offset(total).is_none());

    if total == 0 {
        return;
    }

    // One bulk read equals row-by-row reads.
    let bulk = read_rows(&index, 0, total as usize).expect("bulk read");
    assert_eq!(bulk.slice.len() as u64, total);
    for row in 0..total {
        let single = read_rows(&index, row, 1).expect("single read");
        assert_eq!(single.slice.rows[0], bulk.slice.rows[row as usize]);
    }
});
