use std::path::Path;
use std::time::Instant;

use log::info;
use rowscope::index::{FileIndex, IndexOptions};
use rowscope::reader::read_rows;

fn main() {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: reproduce <artifact-file-or-csv>");
        std::process::exit(1);
    });

    let iterations = std::env::var("ITERATIONS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1);

    eprintln!("=== Input: {path}, {iterations} iteration(s) ===");

    for i in 0..iterations {
        let iter_start = Instant::now();

        let (index, timing) = match FileIndex::build(Path::new(&path), IndexOptions::default()) {
            Ok(built) => built,
            Err(e) => {
                eprintln!("Index error: {e}");
                std::process::exit(1);
            }
        };
        eprintln!(
            "rows={} encoding={} delimiter={} index={:.1}ms",
            index.total_row_count(),
            index.encoding(),
            index.delimiter(),
            timing.millis()
        );

        let mut start = 0;
        while start < index.total_row_count() {
            match read_rows(&index, start, 4096) {
                Ok(read) => start = read.slice.end_row().max(start + 1),
                Err(e) => {
                    eprintln!("Read error at row {start}: {e}");
                    std::process::exit(1);
                }
            }
        }

        info!(
            "iteration {}: total {:.1}ms",
            i,
            iter_start.elapsed().as_secs_f64() * 1000.0
        );
    }
}
