// Workflow metrics module
//
// Counts how each download event was handled so a long-running daemon can report on shutdown

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::models::PrintStatus;

/// Orchestrator metrics
///
/// Uses atomic operations so concurrent workflows can record without locks.
#[derive(Debug)]
pub struct Metrics {
    /// Completed downloads that reached the filter check
    pub downloads_seen: AtomicUsize,

    /// Completed downloads ignored because auto-printing was disabled
    pub skipped_disabled: AtomicUsize,

    /// Completed downloads rejected by the filter rule
    pub skipped_filtered: AtomicUsize,

    /// Downloads whose record could not be resolved
    pub unresolved: AtomicUsize,

    /// Attempts that ended `printed`
    pub printed: AtomicUsize,

    /// Attempts that fell back to manual printing
    pub manual: AtomicUsize,

    /// Attempts that ended in `error`
    pub failed: AtomicUsize,

    /// Surfaces whose ready signal never arrived before the timeout
    pub ready_timeouts: AtomicUsize,

    /// Total time from opening to finalizing, in milliseconds
    pub total_print_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            downloads_seen: AtomicUsize::new(0),
            skipped_disabled: AtomicUsize::new(0),
            skipped_filtered: AtomicUsize::new(0),
            unresolved: AtomicUsize::new(0),
            printed: AtomicUsize::new(0),
            manual: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            ready_timeouts: AtomicUsize::new(0),
            total_print_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_download(&self) {
        self.downloads_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disabled(&self) {
        self.skipped_disabled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.skipped_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unresolved(&self) {
        self.unresolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ready_timeout(&self) {
        self.ready_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the terminal status and duration of one print attempt
    pub fn record_attempt(&self, status: PrintStatus, duration: Duration) {
        let counter = match status {
            PrintStatus::Printed => &self.printed,
            PrintStatus::Manual => &self.manual,
            PrintStatus::Error => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_print_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of print attempts, whatever their outcome
    pub fn attempts(&self) -> usize {
        self.printed.load(Ordering::Relaxed)
            + self.manual.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per print attempt in milliseconds
    pub fn avg_print_time_ms(&self) -> f64 {
        let total = self.total_print_time_ms.load(Ordering::Relaxed);
        let count = self.attempts();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Print Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Downloads: {} completed, {} while disabled, {} filtered out, {} unresolved",
            self.downloads_seen.load(Ordering::Relaxed),
            self.skipped_disabled.load(Ordering::Relaxed),
            self.skipped_filtered.load(Ordering::Relaxed),
            self.unresolved.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Attempts: {} printed, {} manual, {} failed ({} ready timeouts)",
            self.printed.load(Ordering::Relaxed),
            self.manual.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.ready_timeouts.load(Ordering::Relaxed)
        );
        tracing::info!("Average attempt time: {:.2}ms", self.avg_print_time_ms());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
