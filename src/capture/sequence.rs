//! A directory of still images played back as a video file.
//!
//! Frames are the directory's PNG/JPEG files in lexical order. Seeking is
//! exact. The resolution hint is ignored: frames keep the size stored on
//! disk. There is no native frame rate.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{PlaybackConfig, SourceId};

use super::{CaptureBackend, CaptureError, Frame, PixelFormat};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct SequenceBackend {
    files: Vec<PathBuf>,
    position: usize,
}

impl SequenceBackend {
    pub fn open(config: &PlaybackConfig) -> Result<Self, CaptureError> {
        let dir = match &config.source {
            SourceId::Path(path) => Path::new(path),
            SourceId::Index(_) => {
                return Err(CaptureError::unavailable(
                    &config.source,
                    "image sequences need a directory path",
                ))
            }
        };

        let files = list_frames(dir)
            .map_err(|err| CaptureError::unavailable(&config.source, err))?;
        if files.is_empty() {
            return Err(CaptureError::unavailable(&config.source, "no image files"));
        }
        debug!(dir = %dir.display(), frames = files.len(), "image sequence opened");

        Ok(Self {
            position: usize::try_from(config.frame_number).unwrap_or(usize::MAX),
            files,
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.files.len()
    }
}

fn list_frames(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_image && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

impl CaptureBackend for SequenceBackend {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };

        let image = image::open(path)?.into_rgb8();
        let (width, height) = image.dimensions();
        let mut pixels = image.into_raw();
        for px in pixels.chunks_exact_mut(3) {
            px.swap(0, 2);
        }

        let frame =
            Frame::new(pixels, width, height, PixelFormat::Bgr24)?.with_position(self.position as u64);
        self.position += 1;
        Ok(Some(frame))
    }

    fn nominal_fps(&self) -> Option<f64> {
        None
    }

    fn release(&mut self) {
        self.files.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendHint;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_frames(dir: &Path, count: u8) {
        for i in 0..count {
            let image = RgbImage::from_pixel(4, 2, Rgb([i, 100, 200]));
            image.save(dir.join(format!("frame_{i:03}.png"))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();
    }

    fn config(dir: &Path, frame_number: u64) -> PlaybackConfig {
        PlaybackConfig {
            frame_number,
            ..PlaybackConfig::new(
                SourceId::Path(dir.to_string_lossy().into_owned()),
                BackendHint::ImageSequence,
            )
        }
    }

    #[test]
    fn plays_files_in_order_as_bgr() {
        let dir = tempdir().unwrap();
        write_frames(dir.path(), 3);

        let mut backend = SequenceBackend::open(&config(dir.path(), 0)).unwrap();
        assert_eq!(backend.len(), 3);

        let first = backend.read().unwrap().unwrap();
        assert_eq!((first.width(), first.height()), (4, 2));
        assert_eq!(&first.data[..3], &[200, 100, 0]);
        assert_eq!(first.meta.position, Some(0));

        assert!(backend.read().unwrap().is_some());
        assert!(backend.read().unwrap().is_some());
        assert!(backend.read().unwrap().is_none());
    }

    #[test]
    fn starts_at_the_requested_offset() {
        let dir = tempdir().unwrap();
        write_frames(dir.path(), 3);

        let mut backend = SequenceBackend::open(&config(dir.path(), 2)).unwrap();
        let frame = backend.read().unwrap().unwrap();
        assert_eq!(frame.meta.position, Some(2));
        assert_eq!(frame.data[2], 2);
        assert!(backend.read().unwrap().is_none());
    }

    #[test]
    fn empty_or_missing_directories_are_unavailable() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            SequenceBackend::open(&config(dir.path(), 0)),
            Err(CaptureError::Unavailable { .. })
        ));
        assert!(matches!(
            SequenceBackend::open(&config(&dir.path().join("missing"), 0)),
            Err(CaptureError::Unavailable { .. })
        ));
    }
}
