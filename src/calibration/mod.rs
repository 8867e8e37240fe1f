// Calibration - derives a bar probe's reference colors from the live bar.
use log::info;
use thiserror::Error;

use crate::core::color::Rgb;
use crate::core::coords::{Region, WindowId};
use crate::sampling::batch::BatchSampler;
use crate::sampling::cache::SampleKind;

/// Reference colors picked off a live bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarReferences {
    pub full: Rgb,
    pub empty: Rgb,
}

#[derive(Debug, Clone, Error)]
pub enum CalibrationError {
    #[error("bar range {start_x}..{end_x} is too narrow to calibrate")]
    DegenerateRange { start_x: i32, end_x: i32 },

    #[error(
        "references are too close to distinguish (distance {distance:.1}, need more than {required:.1})"
    )]
    IndistinguishableReferences { distance: f32, required: f32 },
}

/// Pick full/empty reference colors for a bar by averaging small regions at
/// its two ends.
///
/// Assumes the filled portion is anchored at the left end and the right end
/// shows the drained state (call this while the bar is partially drained, or
/// with `end_x` just past the fill). Averages go through the shared cache
/// like every other sample, using the region-average TTL, and the same
/// Euclidean metric used at runtime validates that the two references sit
/// further apart than twice the probe tolerance. Both ends reading the same
/// color (including two failed reads, which both default to black) is
/// rejected rather than producing a probe that classifies every pixel the
/// same way.
pub fn calibrate_references(
    sampler: &BatchSampler,
    window: WindowId,
    start_x: i32,
    end_x: i32,
    y: i32,
    tolerance: f32,
) -> Result<BarReferences, CalibrationError> {
    let width = end_x - start_x + 1;
    if width < 4 {
        return Err(CalibrationError::DegenerateRange { start_x, end_x });
    }

    // Small bands inset one pixel from each end, three rows tall so a single
    // noisy scanline cannot dominate the average.
    let sample_w = (width / 8).clamp(2, 12);
    let band_y = (y - 1).max(0);
    let full_region = Region::new(start_x + 1, band_y, sample_w, 3);
    let empty_region = Region::new(end_x - sample_w, band_y, sample_w, 3);

    let max_age = {
        let cache = sampler.cache().lock().unwrap();
        cache.ttl_for(SampleKind::RegionAverage)
    };
    let full = sampler.region_average(window, full_region, max_age);
    let empty = sampler.region_average(window, empty_region, max_age);

    let distance = full.distance(empty);
    let required = 2.0 * tolerance.max(0.0);
    if distance <= required {
        return Err(CalibrationError::IndistinguishableReferences { distance, required });
    }

    info!(
        "calibrated bar on {:?}: full {:?}, empty {:?} (separation {:.1})",
        window, full, empty, distance
    );
    Ok(BarReferences { full, empty })
}
