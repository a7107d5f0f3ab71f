#![no_main]

use std::io::Cursor;

use csv::ByteRecord;
use libfuzzer_sys::fuzz_target;
use rowscope::encoding::Encoding;
use rowscope::parse::{Delimiter, decode_record, detect_delimiter, reader_at};

fuzz_target!(|data: &[u8]| {
    for delimiter in Delimiter::ALL {
        // Record starts strictly increase, and re-reading from a recorded
        // start yields the same record.
        let mut reader = reader_at(Cursor::new(data), delimiter, 0, 256).expect("seek in memory");
        let mut record = ByteRecord::new();
        let mut starts = Vec::new();
        let mut records = Vec::new();
        loop {
            let pos = reader.position().byte();
            if !reader.read_byte_record(&mut record).expect("in-memory read cannot fail") {
                break;
            }
            if let Some(&prev) = starts.last() {
                assert!(pos > prev, "record start {pos} after {prev}");
            }
            assert!(pos <= data.len() as u64);
            starts.push(pos);
            records.push(record.iter().map(<[u8]>::to_vec).collect::<Vec<_>>());
        }

        for (start, expected) in starts.iter().zip(&records) {
            let mut again =
                reader_at(Cursor::new(data), delimiter, *start, 256).expect("seek in memory");
            assert!(again.read_byte_record(&mut record).expect("in-memory read cannot fail"));
            assert_eq!(&record.iter().map(<[u8]>::to_vec).collect::<Vec<_>>(), expected);
            let (fields, _) = decode_record(&record, Encoding::Utf8, true);
            assert_eq!(fields.len(), record.len());
        }
    }

    let _ = detect_delimiter(data);
});
