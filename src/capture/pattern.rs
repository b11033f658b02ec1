//! Synthetic moving-bar source. Seekable and resolution-exact, so it stands
//! in for both files and cameras when no real device is around.

use crate::{PatternConfig, PlaybackConfig};

use super::{CaptureBackend, CaptureError, Frame, PixelFormat};

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;

pub struct PatternBackend {
    width: u32,
    height: u32,
    fps: f64,
    frame_count: Option<u64>,
    position: u64,
}

impl PatternBackend {
    pub fn open(config: &PlaybackConfig, pattern: &PatternConfig) -> Self {
        Self {
            width: config.width.unwrap_or(DEFAULT_WIDTH).max(1),
            height: config.height.unwrap_or(DEFAULT_HEIGHT).max(1),
            fps: pattern.fps,
            frame_count: pattern.frame_count,
            position: config.frame_number,
        }
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let bar = (self.position as usize * 4) % w;
        let mut pixels = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                if x == bar {
                    pixels.extend_from_slice(&[255, 255, 255]);
                } else {
                    // BGR
                    pixels.push((y * 255 / h) as u8);
                    pixels.push(self.position as u8);
                    pixels.push((x * 255 / w) as u8);
                }
            }
        }
        pixels
    }
}

impl CaptureBackend for PatternBackend {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.frame_count.is_some_and(|total| self.position >= total) {
            return Ok(None);
        }

        let frame = Frame::new(self.render(), self.width, self.height, PixelFormat::Bgr24)?
            .with_position(self.position);
        self.position += 1;
        Ok(Some(frame))
    }

    fn nominal_fps(&self) -> Option<f64> {
        Some(self.fps)
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackendHint, SourceId};

    fn pattern(frame_count: Option<u64>) -> PatternConfig {
        PatternConfig {
            frame_count,
            fps: 25.0,
        }
    }

    #[test]
    fn honours_size_and_offset() {
        let config = PlaybackConfig {
            width: Some(16),
            height: Some(8),
            frame_number: 3,
            ..PlaybackConfig::new(SourceId::Index(0), BackendHint::TestPattern)
        };
        let mut backend = PatternBackend::open(&config, &pattern(Some(5)));

        let frame = backend.read().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 8));
        assert_eq!(frame.meta.position, Some(3));
        assert_eq!(backend.read().unwrap().unwrap().meta.position, Some(4));
        assert!(backend.read().unwrap().is_none());
        assert_eq!(backend.nominal_fps(), Some(25.0));
    }

    #[test]
    fn offset_past_the_end_is_immediately_exhausted() {
        let config = PlaybackConfig {
            frame_number: 10,
            ..PlaybackConfig::new(SourceId::Index(0), BackendHint::TestPattern)
        };
        let mut backend = PatternBackend::open(&config, &pattern(Some(10)));
        assert!(backend.read().unwrap().is_none());
    }

    #[test]
    fn endless_pattern_keeps_going() {
        let config = PlaybackConfig {
            width: Some(4),
            height: Some(4),
            ..PlaybackConfig::new(SourceId::Index(0), BackendHint::TestPattern)
        };
        let mut backend = PatternBackend::open(&config, &pattern(None));
        for _ in 0..1_000 {
            assert!(backend.read().unwrap().is_some());
        }
    }
}
