//! Fits the latest frame into the display region and converts it to RGBA.

use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::{Frame, PixelFormat};

/// Current size of the display region, owned by the host toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Tightly packed RGBA8 pixels ready for the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderableImage {
    pub fn pitch(&self) -> usize {
        self.width as usize * 4
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("frame buffer does not match {width}x{height}")]
    Shape { width: u32, height: u32 },
}

/// Largest size with the frame's aspect ratio that fits `geometry`.
///
/// Degenerate geometry is clamped to 1x1. The free dimension is rounded up.
pub fn fit_size(frame_width: u32, frame_height: u32, geometry: Geometry) -> (u32, u32) {
    let (fw, fh) = (frame_width.max(1) as u64, frame_height.max(1) as u64);
    let (gw, gh) = (geometry.width.max(1) as u64, geometry.height.max(1) as u64);

    // Compare fw/fh against gw/gh exactly
    let frame_side = fw * gh;
    let target_side = gw * fh;
    let (w, h) = if frame_side == target_side {
        (gw, gh)
    } else if frame_side < target_side {
        ((gh * fw).div_ceil(fh), gh)
    } else {
        (gw, (gw * fh).div_ceil(fw))
    };
    (w.max(1) as u32, h.max(1) as u32)
}

#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    filter: FilterType,
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

impl Compositor {
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }

    /// Flip, fit, resample and convert `frame` for a region of `geometry`.
    ///
    /// Nothing is retained between calls.
    #[instrument(skip_all, fields(w = geometry.width, h = geometry.height))]
    pub fn render(
        &self,
        frame: &Frame,
        geometry: Geometry,
        flipped: bool,
    ) -> Result<RenderableImage, RenderError> {
        let render_start = Instant::now();
        let (width, height) = (frame.width(), frame.height());
        let target = fit_size(width, height, geometry);
        let shape = || RenderError::Shape { width, height };

        let pixels = match frame.format() {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => {
                let image = RgbImage::from_raw(width, height, frame.data.to_vec()).ok_or_else(shape)?;
                let image = self.flip_and_resize(image, target, flipped);
                let swap = frame.format() == PixelFormat::Bgr24;
                to_rgba(image.as_raw(), swap)
            }
            PixelFormat::Rgba32 => {
                let image: RgbaImage =
                    ImageBuffer::from_raw(width, height, frame.data.to_vec()).ok_or_else(shape)?;
                self.flip_and_resize(image, target, flipped).into_raw()
            }
        };

        metrics::histogram!("render_time_us").record(render_start.elapsed().as_micros() as f64);
        metrics::histogram!("capture_to_render_us").record(frame.age().as_micros() as f64);
        metrics::counter!("frames_rendered").increment(1);

        Ok(RenderableImage {
            width: target.0,
            height: target.1,
            pixels,
        })
    }

    fn flip_and_resize<P>(
        &self,
        mut image: ImageBuffer<P, Vec<u8>>,
        (width, height): (u32, u32),
        flipped: bool,
    ) -> ImageBuffer<P, Vec<u8>>
    where
        P: Pixel<Subpixel = u8> + 'static,
    {
        if flipped {
            imageops::flip_horizontal_in_place(&mut image);
        }
        if image.dimensions() == (width, height) {
            return image;
        }
        imageops::resize(&image, width, height, self.filter)
    }
}

fn to_rgba(rgb: &[u8], swap: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        if swap {
            out.extend_from_slice(&[px[2], px[1], px[0], 255]);
        } else {
            out.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
    }
    out
}
