use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::core::color::Rgb;
use crate::core::coords::{SamplePoint, WindowId};
use crate::sampling::stats::{PerformanceStats, PerformanceTracker};

/// Which kind of sample an entry holds. The two kinds expire independently
/// and never satisfy each other's lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Color,
    RegionAverage,
}

/// Cache tuning knobs. The serialized form lives in `CacheSettings`.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// How long a point sample is trusted.
    pub color_ttl: Duration,
    /// How long a region average is trusted. Typically >= color_ttl.
    pub region_ttl: Duration,
    /// Eviction ceiling across all windows and kinds. 0 disables caching.
    pub max_entries: usize,
    /// Bucketing distance in pixels (Euclidean). 0 means exact-coordinate
    /// matching only.
    pub nearby_threshold: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            color_ttl: Duration::from_millis(40),
            region_ttl: Duration::from_millis(250),
            max_entries: 4096,
            nearby_threshold: 2.0,
        }
    }
}

/// One cached sample. The representative point is fixed when the bucket is
/// created; nearby lookups and refreshes all resolve to it.
struct Bucket {
    representative: SamplePoint,
    kind: SampleKind,
    color: Rgb,
    captured_at: Instant,
    seq: u64,
}

/// Time-windowed memoization of pixel-source reads, keyed by
/// (window, bucketed coordinate, kind).
///
/// Lookups never touch the pixel source; a miss is resolved by the caller
/// reading the source and calling `put`. Buckets per window form an
/// append-order list and the first bucket within `nearby_threshold` of a
/// query wins, so bucket assignment is deterministic for a fixed threshold
/// and insertion order. Stale entries are evicted lazily when a lookup lands
/// on them, and the globally oldest entry is dropped when the cache is at
/// capacity.
pub struct SampleCache {
    config: CacheConfig,
    windows: HashMap<WindowId, Vec<Bucket>>,
    len: usize,
    next_seq: u64,
    tracker: Arc<PerformanceTracker>,
}

impl SampleCache {
    pub fn new(config: CacheConfig) -> Self {
        if config.max_entries == 0 {
            warn!("sample cache constructed with max_entries = 0, caching is disabled");
        }
        Self {
            config,
            windows: HashMap::new(),
            len: 0,
            next_seq: 0,
            tracker: Arc::new(PerformanceTracker::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The hit/miss tracker shared with reporting code.
    pub fn tracker(&self) -> Arc<PerformanceTracker> {
        Arc::clone(&self.tracker)
    }

    /// Configured TTL for a sample kind.
    pub fn ttl_for(&self, kind: SampleKind) -> Duration {
        match kind {
            SampleKind::Color => self.config.color_ttl,
            SampleKind::RegionAverage => self.config.region_ttl,
        }
    }

    /// Look up the bucket covering `point`, accepting the kind's configured TTL.
    pub fn get(&mut self, window: WindowId, point: SamplePoint, kind: SampleKind) -> Option<Rgb> {
        let max_age = self.ttl_for(kind);
        self.get_at(window, point, kind, max_age, Instant::now())
    }

    /// Lookup with an explicit clock and freshness bound. Records one hit or
    /// miss on the tracker. A matched bucket older than `max_age` is removed
    /// (lazy expiry) and reported as a miss.
    pub fn get_at(
        &mut self,
        window: WindowId,
        point: SamplePoint,
        kind: SampleKind,
        max_age: Duration,
        now: Instant,
    ) -> Option<Rgb> {
        let threshold = self.config.nearby_threshold;
        let mut expired = false;
        let found = self.windows.get_mut(&window).and_then(|buckets| {
            let idx = buckets
                .iter()
                .position(|b| b.kind == kind && b.representative.is_near(point, threshold))?;
            if now.duration_since(buckets[idx].captured_at) < max_age {
                Some(buckets[idx].color)
            } else {
                buckets.remove(idx);
                expired = true;
                None
            }
        });
        if expired {
            self.len -= 1;
        }

        match found {
            Some(color) => {
                self.tracker.record_hit();
                Some(color)
            }
            None => {
                self.tracker.record_miss();
                None
            }
        }
    }

    /// Store a sample, stamped with the current time.
    pub fn put(&mut self, window: WindowId, point: SamplePoint, color: Rgb, kind: SampleKind) {
        self.put_at(window, point, color, kind, Instant::now());
    }

    /// Store a sample with an explicit clock. If a bucket already covers
    /// `point` its entry is replaced (keeping the original representative);
    /// otherwise a new bucket is appended, evicting the globally oldest entry
    /// first when at capacity.
    pub fn put_at(
        &mut self,
        window: WindowId,
        point: SamplePoint,
        color: Rgb,
        kind: SampleKind,
        now: Instant,
    ) {
        if self.config.max_entries == 0 {
            return;
        }
        let threshold = self.config.nearby_threshold;
        let seq = self.next_seq;
        self.next_seq += 1;

        {
            let buckets = self.windows.entry(window).or_default();
            if let Some(bucket) = buckets
                .iter_mut()
                .find(|b| b.kind == kind && b.representative.is_near(point, threshold))
            {
                bucket.color = color;
                bucket.captured_at = now;
                bucket.seq = seq;
                return;
            }
        }

        if self.len >= self.config.max_entries {
            self.evict_oldest();
        }
        self.windows.entry(window).or_default().push(Bucket {
            representative: point,
            kind,
            color,
            captured_at: now,
            seq,
        });
        self.len += 1;
    }

    /// Drop every entry for a window. Returns how many were dropped.
    pub fn invalidate_window(&mut self, window: WindowId) -> usize {
        match self.windows.remove(&window) {
            Some(buckets) => {
                self.len -= buckets.len();
                debug!("invalidated {} cache entries for {:?}", buckets.len(), window);
                buckets.len()
            }
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current entry count for one kind.
    pub fn entries_for(&self, kind: SampleKind) -> usize {
        self.windows
            .values()
            .flatten()
            .filter(|b| b.kind == kind)
            .count()
    }

    /// Rough memory footprint: bucket payloads plus per-window list headers.
    pub fn estimated_bytes(&self) -> usize {
        self.len * mem::size_of::<Bucket>()
            + self.windows.len() * mem::size_of::<Vec<Bucket>>()
    }

    /// Point-in-time performance snapshot combining the tracker counters with
    /// the cache's current sizes.
    pub fn stats(&self) -> PerformanceStats {
        PerformanceStats::from_counters(
            self.tracker.hits(),
            self.tracker.misses(),
            self.entries_for(SampleKind::Color),
            self.entries_for(SampleKind::RegionAverage),
            self.estimated_bytes(),
        )
    }

    fn evict_oldest(&mut self) {
        let mut oldest: Option<(WindowId, usize, u64)> = None;
        for (window, buckets) in &self.windows {
            for (idx, bucket) in buckets.iter().enumerate() {
                if oldest.map_or(true, |(_, _, seq)| bucket.seq < seq) {
                    oldest = Some((*window, idx, bucket.seq));
                }
            }
        }
        if let Some((window, idx, _)) = oldest {
            if let Some(buckets) = self.windows.get_mut(&window) {
                buckets.remove(idx);
                self.len -= 1;
            }
        }
    }
}
