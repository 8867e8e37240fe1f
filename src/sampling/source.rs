use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::core::color::Rgb;
use crate::core::coords::{Region, SamplePoint, WindowId};

/// A captured client-area frame.
pub type Frame = image::ImageBuffer<image::Rgb<u8>, Vec<u8>>;

/// Errors a pixel source can report. The sampler absorbs all of these inside
/// the tick; they surface only as default colors and log lines.
#[derive(Debug, Clone, Error)]
pub enum SampleError {
    #[error("window {0:?} is no longer valid")]
    WindowGone(WindowId),

    #[error("pixel read failed: {0}")]
    ReadFailed(String),

    #[error("coordinate ({x}, {y}) is outside the window client area")]
    OutOfBounds { x: i32, y: i32 },
}

pub type SampleResult<T> = Result<T, SampleError>;

/// Reads actual pixel colors from a window. A call is assumed to be a
/// relatively expensive cross-process read; consumers go through the cache
/// and batch sampler rather than calling this directly.
pub trait PixelSource: Send + Sync {
    /// Current color at a client-area coordinate.
    fn color_at(&self, window: WindowId, point: SamplePoint) -> SampleResult<Rgb>;

    /// Average color over a client-area region. The default implementation
    /// samples a coarse grid of individual pixels; implementations with a
    /// native region capture should override it.
    fn region_average(&self, window: WindowId, region: Region) -> SampleResult<Rgb> {
        if region.is_empty() {
            return Err(SampleError::OutOfBounds {
                x: region.x,
                y: region.y,
            });
        }

        // At most a 4x4 grid regardless of region size.
        let step_x = (region.width / 4).max(1);
        let step_y = (region.height / 4).max(1);

        let mut sum = (0u32, 0u32, 0u32);
        let mut count = 0u32;
        let mut y = region.y;
        while y < region.y + region.height {
            let mut x = region.x;
            while x < region.x + region.width {
                if let Ok(c) = self.color_at(window, SamplePoint::new(x, y)) {
                    sum.0 += c.r as u32;
                    sum.1 += c.g as u32;
                    sum.2 += c.b as u32;
                    count += 1;
                }
                x += step_x;
            }
            y += step_y;
        }

        if count == 0 {
            return Err(SampleError::ReadFailed(
                "no pixel in region could be read".to_string(),
            ));
        }
        Ok(Rgb::new(
            (sum.0 / count) as u8,
            (sum.1 / count) as u8,
            (sum.2 / count) as u8,
        ))
    }

    /// Whether the window still exists. The polling driver stops scheduling
    /// ticks for windows that disappear.
    fn window_exists(&self, _window: WindowId) -> bool {
        true
    }
}

/// Pixel source backed by already-captured frames, one per window.
///
/// Useful when a consumer holds a full-window capture and wants cached
/// sampling over it, and as the stand-in source for everything above the
/// source boundary in tests.
#[derive(Default)]
pub struct FramePixelSource {
    frames: Mutex<HashMap<WindowId, Frame>>,
}

impl FramePixelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the frame backing a window.
    pub fn insert_frame(&self, window: WindowId, frame: Frame) {
        self.frames.lock().unwrap().insert(window, frame);
    }

    /// Drop a window's frame; subsequent reads report the window gone.
    pub fn remove_frame(&self, window: WindowId) {
        self.frames.lock().unwrap().remove(&window);
    }
}

impl PixelSource for FramePixelSource {
    fn color_at(&self, window: WindowId, point: SamplePoint) -> SampleResult<Rgb> {
        let frames = self.frames.lock().unwrap();
        let frame = frames
            .get(&window)
            .ok_or(SampleError::WindowGone(window))?;
        if point.x < 0
            || point.y < 0
            || point.x >= frame.width() as i32
            || point.y >= frame.height() as i32
        {
            return Err(SampleError::OutOfBounds {
                x: point.x,
                y: point.y,
            });
        }
        Ok(Rgb::from(*frame.get_pixel(point.x as u32, point.y as u32)))
    }

    fn window_exists(&self, window: WindowId) -> bool {
        self.frames.lock().unwrap().contains_key(&window)
    }
}
