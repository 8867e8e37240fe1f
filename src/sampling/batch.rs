use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use crate::core::color::Rgb;
use crate::core::coords::{Region, SamplePoint, WindowId};
use crate::sampling::cache::{SampleCache, SampleKind};
use crate::sampling::source::PixelSource;

/// Resolves coordinate sets cache-first, reading the pixel source exactly
/// once per coordinate the cache could not satisfy.
///
/// Cheap to clone; clones share the same cache and source. The cache lock is
/// never held across a pixel-source call, so one window's slow reads do not
/// stall another window's cache hits.
#[derive(Clone)]
pub struct BatchSampler {
    cache: Arc<Mutex<SampleCache>>,
    source: Arc<dyn PixelSource>,
}

impl BatchSampler {
    pub fn new(cache: Arc<Mutex<SampleCache>>, source: Arc<dyn PixelSource>) -> Self {
        Self { cache, source }
    }

    pub fn cache(&self) -> &Arc<Mutex<SampleCache>> {
        &self.cache
    }

    pub fn source(&self) -> &Arc<dyn PixelSource> {
        &self.source
    }

    /// Resolve every input coordinate to a color.
    ///
    /// The returned map always contains every input coordinate. Cache hits
    /// must be no older than `max_age`; misses are read from the source and
    /// stored. A coordinate whose read fails maps to `Rgb::BLACK` and never
    /// aborts the rest of the batch. Duplicate input coordinates are resolved
    /// once.
    pub fn sample_many(
        &self,
        window: WindowId,
        points: &[SamplePoint],
        max_age: Duration,
    ) -> HashMap<SamplePoint, Rgb> {
        let mut resolved: HashMap<SamplePoint, Rgb> = HashMap::with_capacity(points.len());
        let mut unresolved: Vec<SamplePoint> = Vec::new();

        {
            let mut cache = self.cache.lock().unwrap();
            let now = Instant::now();
            let mut pending: HashSet<SamplePoint> = HashSet::new();
            for &point in points {
                if resolved.contains_key(&point) || pending.contains(&point) {
                    continue;
                }
                match cache.get_at(window, point, SampleKind::Color, max_age, now) {
                    Some(color) => {
                        resolved.insert(point, color);
                    }
                    None => {
                        pending.insert(point);
                        unresolved.push(point);
                    }
                }
            }
        }

        // Source reads happen outside the cache lock so other windows' passes
        // keep hitting the cache meanwhile.
        let mut fresh: Vec<(SamplePoint, Rgb)> = Vec::with_capacity(unresolved.len());
        for point in unresolved {
            match self.source.color_at(window, point) {
                Ok(color) => {
                    fresh.push((point, color));
                    resolved.insert(point, color);
                }
                Err(err) => {
                    debug!(
                        "pixel read failed at ({}, {}) in {:?}: {}",
                        point.x, point.y, window, err
                    );
                    resolved.insert(point, Rgb::BLACK);
                }
            }
        }

        // Failed reads are not stored; the next tick retries them.
        if !fresh.is_empty() {
            let mut cache = self.cache.lock().unwrap();
            let now = Instant::now();
            for (point, color) in fresh {
                cache.put_at(window, point, color, SampleKind::Color, now);
            }
        }

        resolved
    }

    /// Average color over a region, cached under `SampleKind::RegionAverage`
    /// with the region's center as the bucket representative. Regions sharing
    /// a center share an entry, which is the same coarse tradeoff nearby
    /// bucketing makes for points. Failure yields `Rgb::BLACK`.
    pub fn region_average(&self, window: WindowId, region: Region, max_age: Duration) -> Rgb {
        if region.is_empty() {
            debug!("region average requested for empty region {:?}", region);
            return Rgb::BLACK;
        }

        let center = region.center();
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(color) =
                cache.get_at(window, center, SampleKind::RegionAverage, max_age, Instant::now())
            {
                return color;
            }
        }

        match self.source.region_average(window, region) {
            Ok(color) => {
                self.cache.lock().unwrap().put_at(
                    window,
                    center,
                    color,
                    SampleKind::RegionAverage,
                    Instant::now(),
                );
                color
            }
            Err(err) => {
                debug!("region average failed for {:?} in {:?}: {}", region, window, err);
                Rgb::BLACK
            }
        }
    }
}
