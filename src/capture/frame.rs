use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::CaptureError;

/// One decoded raster image.
///
/// The pixel buffer is immutable once produced; cloning shares it.
#[derive(Clone)]
pub struct Frame {
    /// Tightly packed rows, `meta.stride` bytes each
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// When the backend produced this frame
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Read counter of the source that produced this frame, starting at 1
    pub sequence: u64,
    /// Zero-based capture position, when the backend knows it
    pub position: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
}

/// 8-bit pixel layouts a frame can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Bgr24,
    Rgb24,
    Rgba32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 => 4,
        }
    }
}

impl Frame {
    /// Wrap a packed pixel buffer, checking it matches the stated shape.
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, CaptureError> {
        let data = data.into();
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidFrame(format!(
                "empty frame {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(CaptureError::InvalidFrame(format!(
                "{width}x{height} {format:?} needs {expected} bytes, got {}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence: 0,
                position: None,
                width,
                height,
                stride: width * format.bytes_per_pixel() as u32,
                format,
            }),
            timestamp: Instant::now(),
        })
    }

    pub fn with_position(mut self, position: u64) -> Self {
        Arc::make_mut(&mut self.meta).position = Some(position);
        self
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        Arc::make_mut(&mut self.meta).sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }

    /// Time since capture, reported as render latency.
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("meta", &self.meta)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_buffers_of_the_wrong_length() {
        assert!(Frame::new(vec![0u8; 12], 2, 2, PixelFormat::Bgr24).is_ok());
        assert!(Frame::new(vec![0u8; 11], 2, 2, PixelFormat::Bgr24).is_err());
        assert!(Frame::new(vec![0u8; 16], 2, 2, PixelFormat::Rgba32).is_ok());
        assert!(Frame::new(Vec::<u8>::new(), 0, 4, PixelFormat::Rgb24).is_err());
    }

    #[test]
    fn metadata_edits_do_not_touch_clones() {
        let frame = Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Bgr24).unwrap();
        let moved = frame.clone().with_position(7);
        assert_eq!(moved.meta.position, Some(7));
        assert_eq!(frame.meta.position, None);
        assert_eq!(moved.meta.stride, 3);
    }

    #[test]
    fn age_counts_from_capture_and_survives_clones() {
        let frame = Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Bgr24).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let clone = frame.clone().with_position(1);
        assert_eq!(clone.timestamp, frame.timestamp);
        assert!(clone.age() >= Duration::from_millis(5));
    }
}
