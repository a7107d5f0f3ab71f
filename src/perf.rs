//! Per-operation timings.
//!
//! Worker calls return a [`Timing`] alongside their result instead of writing
//! into a shared counter map. The consumer thread folds them into a
//! [`PerfLog`], which the status bar renders.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// How long one named operation took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    pub operation: String,
    pub duration: Duration,
}

impl Timing {
    pub fn new(operation: impl Into<String>, duration: Duration) -> Self {
        Self {
            operation: operation.into(),
            duration,
        }
    }

    /// Build a timing that ends now.
    pub fn since(operation: impl Into<String>, start: Instant) -> Self {
        Self::new(operation, start.elapsed())
    }

    pub fn millis(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// Latest duration per operation, oldest entries evicted first.
pub struct PerfLog {
    entries: Vec<Timing>,
    capacity: usize,
}

impl Default for PerfLog {
    fn default() -> Self {
        Self::new(4)
    }
}

impl PerfLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a timing. A repeated operation name replaces its old entry and
    /// moves to the back.
    pub fn record(&mut self, timing: Timing) {
        self.entries.retain(|t| t.operation != timing.operation);
        self.entries.push(timing);
        if self.entries.len() > self.capacity {
            let excess = self.entries.len() - self.capacity;
            self.entries.drain(..excess);
        }
    }

    pub fn get(&self, operation: &str) -> Option<Duration> {
        self.entries
            .iter()
            .find(|t| t.operation == operation)
            .map(|t| t.duration)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `"index: 12.3ms, rows 1-300: 0.8ms"`
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        for (i, t) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}: {:.1}ms", t.operation, t.millis());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_summary_lists_in_record_order() {
        let mut log = PerfLog::new(4);
        log.record(Timing::new("index", ms(12)));
        log.record(Timing::new("rows 1-300", ms(1)));
        assert_eq!(log.format_summary(), "index: 12.0ms, rows 1-300: 1.0ms");
    }

    #[test]
    fn test_repeated_operation_replaces_entry() {
        let mut log = PerfLog::new(4);
        log.record(Timing::new("index", ms(12)));
        log.record(Timing::new("rows", ms(1)));
        log.record(Timing::new("index", ms(30)));
        assert_eq!(log.get("index"), Some(ms(30)));
        assert_eq!(log.format_summary(), "rows: 1.0ms, index: 30.0ms");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = PerfLog::new(2);
        log.record(Timing::new("a", ms(1)));
        log.record(Timing::new("b", ms(2)));
        log.record(Timing::new("c", ms(3)));
        assert_eq!(log.get("a"), None);
        assert_eq!(log.get("c"), Some(ms(3)));
    }

    #[test]
    fn test_empty_summary() {
        let log = PerfLog::default();
        assert!(log.is_empty());
        assert_eq!(log.format_summary(), "");
    }
}
