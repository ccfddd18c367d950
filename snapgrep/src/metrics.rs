use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::results::{ScanOutput, ScanStatus};

/// Counters shared by every scan run through one [`Scanner`](crate::search::Scanner).
///
/// Clones share the same counters, so a caller can keep a handle and read it
/// while scans run elsewhere.
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    scans: Arc<AtomicU64>,
    files_searched: Arc<AtomicU64>,
    files_skipped: Arc<AtomicU64>,
    files_matched: Arc<AtomicU64>,
    limit_hits: Arc<AtomicU64>,
    deadline_hits: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            scans: Arc::new(AtomicU64::new(0)),
            files_searched: Arc::new(AtomicU64::new(0)),
            files_skipped: Arc::new(AtomicU64::new(0)),
            files_matched: Arc::new(AtomicU64::new(0)),
            limit_hits: Arc::new(AtomicU64::new(0)),
            deadline_hits: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a scan that returned results
    pub fn record_scan(&self, output: &ScanOutput) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.files_searched
            .fetch_add(output.stats.files_searched, Ordering::Relaxed);
        self.files_skipped
            .fetch_add(output.stats.files_skipped, Ordering::Relaxed);
        self.files_matched
            .fetch_add(output.matches.len() as u64, Ordering::Relaxed);
        if output.limit_hit {
            self.limit_hits.fetch_add(1, Ordering::Relaxed);
        }
        if output.status == ScanStatus::DeadlineExceeded {
            self.deadline_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a scan that failed
    pub fn record_error(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            files_searched: self.files_searched.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_matched: self.files_matched.load(Ordering::Relaxed),
            limit_hits: self.limit_hits.load(Ordering::Relaxed),
            deadline_hits: self.deadline_hits.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Scans: {} ({} failed)\n\
             Files searched/skipped: {}/{}\n\
             Files matched: {}\n\
             Limit/deadline hits: {}/{}",
            stats.scans,
            stats.errors,
            stats.files_searched,
            stats.files_skipped,
            stats.files_matched,
            stats.limit_hits,
            stats.deadline_hits
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub scans: u64,
    pub files_searched: u64,
    pub files_skipped: u64,
    pub files_matched: u64,
    pub limit_hits: u64,
    pub deadline_hits: u64,
    pub errors: u64,
}
