use windows::Win32::Foundation::COLORREF;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    GetPixel, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
    SRCCOPY,
};

use crate::core::color::Rgb;
use crate::core::coords::{Region, SamplePoint, WindowId};
use crate::core::window;
use crate::sampling::source::{Frame, PixelSource, SampleError, SampleResult};

const COLORREF_INVALID: u32 = 0xFFFF_FFFF;

/// Pixel source backed by live GDI reads against a window's client area.
///
/// Single pixels go through GetPixel; region averages BitBlt the region into
/// a memory bitmap first. Both read visible pixels, so a minimized or fully
/// occluded client returns invalid data.
#[derive(Debug, Default, Clone, Copy)]
pub struct GdiPixelSource;

impl GdiPixelSource {
    pub fn new() -> Self {
        Self
    }

    /// Capture a client-area region using BitBlt
    pub fn capture_region(&self, window: WindowId, region: Region) -> SampleResult<Frame> {
        if !window::is_window_valid(window) {
            return Err(SampleError::WindowGone(window));
        }
        if region.is_empty() || region.x < 0 || region.y < 0 {
            return Err(SampleError::OutOfBounds {
                x: region.x,
                y: region.y,
            });
        }
        if let Some((w, h)) = window::client_size(window) {
            if region.x + region.width > w || region.y + region.height > h {
                return Err(SampleError::OutOfBounds {
                    x: region.x,
                    y: region.y,
                });
            }
        }

        let hwnd = window::to_hwnd(window);
        let width = region.width;
        let height = region.height;

        unsafe {
            let hdc = GetDC(hwnd);
            if hdc.is_invalid() {
                return Err(SampleError::ReadFailed(
                    "failed to get device context".to_string(),
                ));
            }

            let mem_dc = CreateCompatibleDC(hdc);
            if mem_dc.is_invalid() {
                let _ = ReleaseDC(hwnd, hdc);
                return Err(SampleError::ReadFailed(
                    "failed to create compatible DC".to_string(),
                ));
            }

            let bitmap = CreateCompatibleBitmap(hdc, width, height);
            if bitmap.is_invalid() {
                let _ = DeleteDC(mem_dc);
                let _ = ReleaseDC(hwnd, hdc);
                return Err(SampleError::ReadFailed(
                    "failed to create compatible bitmap".to_string(),
                ));
            }

            let old_bitmap = SelectObject(mem_dc, bitmap);

            let blit = BitBlt(
                mem_dc,
                0,
                0,
                width,
                height,
                hdc,
                region.x,
                region.y,
                SRCCOPY,
            );

            if blit.is_err() {
                let _ = SelectObject(mem_dc, old_bitmap);
                let _ = DeleteObject(bitmap);
                let _ = DeleteDC(mem_dc);
                let _ = ReleaseDC(hwnd, hdc);
                return Err(SampleError::ReadFailed(
                    "BitBlt could not capture the region".to_string(),
                ));
            }

            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    biHeight: -height, // Negative for top-down bitmap
                    biPlanes: 1,
                    biBitCount: 24, // RGB (3 bytes per pixel)
                    biCompression: BI_RGB.0 as u32,
                    biSizeImage: 0,
                    biXPelsPerMeter: 0,
                    biYPelsPerMeter: 0,
                    biClrUsed: 0,
                    biClrImportant: 0,
                },
                bmiColors: [Default::default(); 1],
            };

            // GetDIBits pads each scan line to a DWORD boundary
            let stride = ((width * 3 + 3) / 4 * 4) as usize;
            let mut buffer: Vec<u8> = vec![0; stride * height as usize];

            let scan_lines = GetDIBits(
                mem_dc,
                bitmap,
                0,
                height as u32,
                Some(buffer.as_mut_ptr() as *mut _),
                &mut bmi,
                DIB_RGB_COLORS,
            );

            // Cleanup GDI objects
            let _ = SelectObject(mem_dc, old_bitmap);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            let _ = ReleaseDC(hwnd, hdc);

            if scan_lines == 0 {
                return Err(SampleError::ReadFailed(
                    "failed to get bitmap bits".to_string(),
                ));
            }

            // Windows hands back BGR, the frame wants RGB
            let mut frame = Frame::new(width as u32, height as u32);
            for y in 0..height as usize {
                for x in 0..width as usize {
                    let idx = y * stride + x * 3;
                    let b = buffer[idx];
                    let g = buffer[idx + 1];
                    let r = buffer[idx + 2];
                    frame.put_pixel(x as u32, y as u32, image::Rgb([r, g, b]));
                }
            }

            Ok(frame)
        }
    }
}

impl PixelSource for GdiPixelSource {
    fn color_at(&self, window: WindowId, point: SamplePoint) -> SampleResult<Rgb> {
        if !window::is_window_valid(window) {
            return Err(SampleError::WindowGone(window));
        }
        if point.x < 0 || point.y < 0 {
            return Err(SampleError::OutOfBounds {
                x: point.x,
                y: point.y,
            });
        }
        if let Some((w, h)) = window::client_size(window) {
            if point.x >= w || point.y >= h {
                return Err(SampleError::OutOfBounds {
                    x: point.x,
                    y: point.y,
                });
            }
        }

        let hwnd = window::to_hwnd(window);
        unsafe {
            let hdc = GetDC(hwnd);
            if hdc.is_invalid() {
                return Err(SampleError::ReadFailed(
                    "failed to get device context".to_string(),
                ));
            }

            let color = GetPixel(hdc, point.x, point.y);
            let _ = ReleaseDC(hwnd, hdc);

            if color.0 == COLORREF_INVALID {
                return Err(SampleError::ReadFailed(format!(
                    "GetPixel failed at ({}, {})",
                    point.x, point.y
                )));
            }

            Ok(decode_colorref(color))
        }
    }

    fn region_average(&self, window: WindowId, region: Region) -> SampleResult<Rgb> {
        let frame = self.capture_region(window, region)?;

        let mut sum = (0u64, 0u64, 0u64);
        for pixel in frame.pixels() {
            sum.0 += pixel.0[0] as u64;
            sum.1 += pixel.0[1] as u64;
            sum.2 += pixel.0[2] as u64;
        }

        // capture_region rejects empty regions, so the count is never zero
        let count = (frame.width() * frame.height()) as u64;
        Ok(Rgb::new(
            (sum.0 / count) as u8,
            (sum.1 / count) as u8,
            (sum.2 / count) as u8,
        ))
    }

    fn window_exists(&self, window: WindowId) -> bool {
        window::is_window_valid(window)
    }
}

/// COLORREF packs the channels as 0x00BBGGRR.
fn decode_colorref(color: COLORREF) -> Rgb {
    Rgb::new(
        (color.0 & 0xFF) as u8,
        ((color.0 >> 8) & 0xFF) as u8,
        ((color.0 >> 16) & 0xFF) as u8,
    )
}
