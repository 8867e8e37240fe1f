use crate::core::color::Rgb;
use crate::core::coords::{SamplePoint, WindowId};
use crate::sampling::batch::BatchSampler;
use crate::sampling::cache::SampleKind;

/// A configured horizontal bar to monitor: pixel range, reference colors and
/// the tolerance used by calibration checks.
///
/// Created once (usually from a profile plus calibration), read every poll
/// tick, mutated only by recalibration or explicit coordinate edits. The
/// cache knows nothing about probes; a probe is just a consumer of sampled
/// colors.
#[derive(Debug, Clone)]
pub struct BarProbe {
    pub window: WindowId,
    pub start_x: i32,
    pub end_x: i32,
    pub y: i32,
    /// Reference color of a filled bar pixel.
    pub full: Rgb,
    /// Reference color of a drained/background pixel.
    pub empty: Rgb,
    /// Color-match threshold (Euclidean) used when validating references.
    pub tolerance: f32,
    /// Sample every Nth pixel across the bar. 0 is treated as 1.
    pub stride: usize,
    /// Most recent estimate. Starts at 100 so a probe is not considered
    /// drained before its first sample.
    pub last_percentage: f64,
}

impl BarProbe {
    pub fn new(window: WindowId, start_x: i32, end_x: i32, y: i32, full: Rgb, empty: Rgb) -> Self {
        Self {
            window,
            start_x,
            end_x,
            y,
            full,
            empty,
            tolerance: 60.0,
            stride: 2,
            last_percentage: 100.0,
        }
    }

    /// The coordinates a single estimate samples, in left-to-right order.
    /// Empty when the range is inverted.
    pub fn sample_points(&self) -> Vec<SamplePoint> {
        if self.end_x < self.start_x {
            return Vec::new();
        }
        let stride = self.stride.max(1);
        (self.start_x..=self.end_x)
            .step_by(stride)
            .map(|x| SamplePoint::new(x, self.y))
            .collect()
    }
}

/// Estimates how full a bar is by classifying sampled pixels against the
/// probe's reference colors.
#[derive(Clone)]
pub struct BarEstimator {
    sampler: BatchSampler,
}

impl BarEstimator {
    pub fn new(sampler: BatchSampler) -> Self {
        Self { sampler }
    }

    pub fn sampler(&self) -> &BatchSampler {
        &self.sampler
    }

    /// Estimate the filled percentage of `probe`'s bar, in [0, 100].
    ///
    /// Samples the probe's stride points through the batch sampler (so
    /// overlapping probes share cache entries), counts a pixel as filled when
    /// it is strictly closer to `full` than to `empty` in RGB distance, and
    /// records the result on the probe. A degenerate range estimates 0.
    pub fn estimate(&self, probe: &mut BarProbe) -> f64 {
        let points = probe.sample_points();
        if points.is_empty() {
            probe.last_percentage = 0.0;
            return 0.0;
        }

        let max_age = {
            let cache = self.sampler.cache().lock().unwrap();
            cache.ttl_for(SampleKind::Color)
        };
        let colors = self.sampler.sample_many(probe.window, &points, max_age);

        let filled = points
            .iter()
            .filter(|p| {
                colors
                    .get(p)
                    .map_or(false, |c| c.is_closer_to(probe.full, probe.empty))
            })
            .count();

        let percentage = 100.0 * filled as f64 / points.len() as f64;
        probe.last_percentage = percentage;
        percentage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::cache::{CacheConfig, SampleCache};
    use crate::sampling::source::{Frame, FramePixelSource, PixelSource};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const W: WindowId = WindowId(1);
    const RED: Rgb = Rgb::new(255, 0, 0);

    /// Frame whose row `y` is red for x < red_until and black beyond.
    fn bar_frame(red_until: i32) -> Frame {
        Frame::from_fn(256, 64, |x, _| {
            if (x as i32) < red_until {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 0])
            }
        })
    }

    fn estimator_over(frame: Frame, color_ttl: Duration) -> BarEstimator {
        let source = FramePixelSource::new();
        source.insert_frame(W, frame);
        let cache = Arc::new(Mutex::new(SampleCache::new(CacheConfig {
            color_ttl,
            nearby_threshold: 0.0,
            ..CacheConfig::default()
        })));
        BarEstimator::new(BatchSampler::new(
            cache,
            Arc::new(source) as Arc<dyn PixelSource>,
        ))
    }

    #[test]
    fn test_21px_bar_stride_2_six_red_five_black() {
        // Bar x=100..=120 at stride 2 gives 11 samples; red through x=110
        // makes 100,102,..,110 red (6) and 112,..,120 black (5).
        let estimator = estimator_over(bar_frame(111), Duration::from_secs(60));
        let mut probe = BarProbe::new(W, 100, 120, 10, RED, Rgb::BLACK);

        let pct = estimator.estimate(&mut probe);
        assert!((pct - 600.0 / 11.0).abs() < 1e-9);
        assert_eq!(probe.last_percentage, pct);
    }

    #[test]
    fn test_all_full_is_100_and_all_empty_is_0() {
        let estimator = estimator_over(bar_frame(256), Duration::from_secs(60));
        let mut probe = BarProbe::new(W, 20, 80, 5, RED, Rgb::BLACK);
        assert_eq!(estimator.estimate(&mut probe), 100.0);

        let estimator = estimator_over(bar_frame(0), Duration::from_secs(60));
        let mut probe = BarProbe::new(W, 20, 80, 5, RED, Rgb::BLACK);
        assert_eq!(estimator.estimate(&mut probe), 0.0);
    }

    #[test]
    fn test_result_stays_in_bounds() {
        for red_until in [0, 1, 37, 100, 256] {
            let estimator = estimator_over(bar_frame(red_until), Duration::from_secs(60));
            let mut probe = BarProbe::new(W, 0, 255, 0, RED, Rgb::BLACK);
            let pct = estimator.estimate(&mut probe);
            assert!((0.0..=100.0).contains(&pct), "pct {} out of bounds", pct);
        }
    }

    #[test]
    fn test_inverted_range_estimates_zero() {
        let estimator = estimator_over(bar_frame(256), Duration::from_secs(60));
        let mut probe = BarProbe::new(W, 120, 100, 10, RED, Rgb::BLACK);
        assert_eq!(estimator.estimate(&mut probe), 0.0);
        assert_eq!(probe.last_percentage, 0.0);
    }

    #[test]
    fn test_single_pixel_bar_is_all_or_nothing() {
        let estimator = estimator_over(bar_frame(256), Duration::from_secs(60));
        let mut probe = BarProbe::new(W, 50, 50, 0, RED, Rgb::BLACK);
        assert_eq!(estimator.estimate(&mut probe), 100.0);
    }

    #[test]
    fn test_zero_stride_treated_as_one() {
        let mut probe = BarProbe::new(W, 0, 4, 0, RED, Rgb::BLACK);
        probe.stride = 0;
        assert_eq!(probe.sample_points().len(), 5);
    }

    #[test]
    fn test_stride_one_samples_every_pixel() {
        let estimator = estimator_over(bar_frame(11), Duration::from_secs(60));
        let mut probe = BarProbe::new(W, 0, 20, 0, RED, Rgb::BLACK);
        probe.stride = 1;
        // 21 samples, 11 red.
        let pct = estimator.estimate(&mut probe);
        assert!((pct - 1100.0 / 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_noisy_pixels_classify_to_nearest_reference() {
        let frame = Frame::from_fn(64, 8, |x, _| {
            if x < 16 {
                image::Rgb([230, 25, 20]) // near red
            } else {
                image::Rgb([20, 10, 15]) // near black
            }
        });
        let estimator = estimator_over(frame, Duration::from_secs(60));
        let mut probe = BarProbe::new(W, 0, 31, 0, RED, Rgb::BLACK);
        probe.stride = 1;
        assert_eq!(estimator.estimate(&mut probe), 50.0);
    }

    #[test]
    fn test_second_estimate_is_served_from_cache() {
        let estimator = estimator_over(bar_frame(111), Duration::from_secs(60));
        let mut probe = BarProbe::new(W, 100, 120, 10, RED, Rgb::BLACK);

        estimator.estimate(&mut probe);
        estimator.estimate(&mut probe);

        let stats = estimator.sampler().cache().lock().unwrap().stats();
        assert_eq!(stats.misses, 11);
        assert_eq!(stats.hits, 11);
    }

    #[test]
    fn test_failed_reads_count_as_empty() {
        // Probe extends past the frame edge; out-of-bounds reads default to
        // black, which classifies as empty against a red reference.
        let estimator = estimator_over(bar_frame(256), Duration::from_secs(60));
        let mut probe = BarProbe::new(W, 250, 260, 0, RED, Rgb::new(10, 10, 10));
        probe.stride = 1;
        let pct = estimator.estimate(&mut probe);
        // 6 in-frame red pixels of 11 sampled.
        assert!((pct - 600.0 / 11.0).abs() < 1e-9);
    }
}
