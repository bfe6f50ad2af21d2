use std::time::{Duration, Instant};

use crate::publish::PublishReport;

/// Counters for one worker, merged into the run summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub files_processed: usize,
    pub files_empty: usize,
    pub events_parsed: usize,
    pub documents_published: usize,
    pub documents_failed: usize,
    pub bytes_consumed: u64,
    /// Text ahead of the first record marker of a span, consumed unparsed
    pub bytes_skipped: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&mut self, report: PublishReport) {
        self.documents_published += report.documents - report.failed;
        self.documents_failed += report.failed;
    }

    pub fn merge(&mut self, other: &RunStats) {
        self.files_processed += other.files_processed;
        self.files_empty += other.files_empty;
        self.events_parsed += other.events_parsed;
        self.documents_published += other.documents_published;
        self.documents_failed += other.documents_failed;
        self.bytes_consumed += other.bytes_consumed;
        self.bytes_skipped += other.bytes_skipped;
    }

    pub fn format_stats(&self, elapsed: Duration) -> String {
        let mut output = format!(
            "Files processed: {} ({} without events); Events parsed: {}; Documents: {} published",
            self.files_processed, self.files_empty, self.events_parsed, self.documents_published
        );

        if self.documents_failed > 0 {
            output.push_str(&format!(", {} failed", self.documents_failed));
        }

        let elapsed_ms = elapsed.as_millis();
        output.push_str(&format!("; {} bytes in {}ms", self.bytes_consumed, elapsed_ms));
        if self.bytes_skipped > 0 {
            output.push_str(&format!(" ({} unparsed)", self.bytes_skipped));
        }

        if elapsed_ms > 0 && self.events_parsed > 0 {
            let events_per_sec = (self.events_parsed as f64 * 1000.0) / elapsed_ms as f64;
            output.push_str(&format!(" ({:.0} events/s)", events_per_sec));
        }

        output
    }
}

/// Run-wide totals with the wall-clock time they took
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: RunStats,
    pub files_scheduled: usize,
    pub workers: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn empty(started: Instant) -> Self {
        Self {
            stats: RunStats::new(),
            files_scheduled: 0,
            workers: 0,
            elapsed: started.elapsed(),
            cancelled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_publish_accounting() {
        let mut a = RunStats::new();
        a.files_processed = 1;
        a.events_parsed = 10;
        a.record_publish(PublishReport {
            documents: 10,
            failed: 2,
        });

        let mut b = RunStats::new();
        b.files_processed = 2;
        b.files_empty = 1;
        b.bytes_consumed = 400;
        b.bytes_skipped = 9;

        a.merge(&b);
        assert_eq!(a.files_processed, 3);
        assert_eq!(a.files_empty, 1);
        assert_eq!(a.documents_published, 8);
        assert_eq!(a.documents_failed, 2);
        assert_eq!(a.bytes_consumed, 400);
        assert_eq!(a.bytes_skipped, 9);
        assert!(a.format_stats(Duration::ZERO).contains("400 bytes in 0ms (9 unparsed)"));
    }

    #[test]
    fn test_format_stats() {
        let stats = RunStats {
            files_processed: 2,
            events_parsed: 100,
            documents_published: 99,
            documents_failed: 1,
            bytes_consumed: 2048,
            ..Default::default()
        };
        let text = stats.format_stats(Duration::from_millis(500));
        assert!(text.starts_with("Files processed: 2 (0 without events)"));
        assert!(text.contains("99 published, 1 failed"));
        assert!(text.ends_with("(200 events/s)"));
    }
}
