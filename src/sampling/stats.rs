use std::sync::atomic::{AtomicU64, Ordering};

use log::info;

/// Cumulative hit/miss counters for the sample cache.
///
/// Counters are process-lifetime cumulative and reset only by constructing a
/// new tracker alongside a new cache. Increments are lock-free so polling
/// passes from multiple windows never contend here.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Point-in-time performance numbers, derived from the tracker counters and
/// the cache's current sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    /// hits / max(1, total_requests); never divides by zero.
    pub hit_rate: f64,
    /// Each hit is exactly one avoided pixel-source call.
    pub api_calls_saved: u64,
    pub reduction_percent: f64,
    pub color_entries: usize,
    pub region_entries: usize,
    pub estimated_bytes: usize,
}

impl PerformanceStats {
    pub(crate) fn from_counters(
        hits: u64,
        misses: u64,
        color_entries: usize,
        region_entries: usize,
        estimated_bytes: usize,
    ) -> Self {
        let total_requests = hits + misses;
        let hit_rate = hits as f64 / total_requests.max(1) as f64;
        Self {
            hits,
            misses,
            total_requests,
            hit_rate,
            api_calls_saved: hits,
            reduction_percent: hit_rate * 100.0,
            color_entries,
            region_entries,
            estimated_bytes,
        }
    }

    pub fn total_entries(&self) -> usize {
        self.color_entries + self.region_entries
    }

    /// One-line summary for the periodic report.
    pub fn log_summary(&self) {
        info!(
            "cache: {}/{} hits ({:.1}% reduction), {} API calls saved, {} entries ({} color, {} region), ~{} KB",
            self.hits,
            self.total_requests,
            self.reduction_percent,
            self.api_calls_saved,
            self.total_entries(),
            self.color_entries,
            self.region_entries,
            self.estimated_bytes / 1024,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_math() {
        let tracker = PerformanceTracker::new();
        for _ in 0..3 {
            tracker.record_hit();
        }
        tracker.record_miss();

        let stats = PerformanceStats::from_counters(tracker.hits(), tracker.misses(), 0, 0, 0);
        assert_eq!(stats.total_requests, 4);
        assert!((stats.hit_rate - 0.75).abs() < 1e-9);
        assert!((stats.reduction_percent - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_requests_does_not_divide_by_zero() {
        let stats = PerformanceStats::from_counters(0, 0, 0, 0, 0);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.reduction_percent, 0.0);
        assert_eq!(stats.api_calls_saved, 0);
    }

    #[test]
    fn test_calls_saved_equals_hits() {
        let stats = PerformanceStats::from_counters(17, 3, 2, 1, 128);
        assert_eq!(stats.api_calls_saved, 17);
        assert_eq!(stats.total_entries(), 3);
    }
}
