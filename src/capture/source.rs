//! Backend-neutral frame source.
//!
//! Backends treat the requested width/height and starting offset as hints:
//! a V4L2 device clamps the size to the nearest mode it supports and cannot
//! seek, an image sequence keeps the size of the files on disk, the test
//! pattern honours both. None of these are reported as errors.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::{BackendHint, PatternConfig, PlaybackConfig, SourceId};

use super::pattern::PatternBackend;
use super::sequence::SequenceBackend;
use super::{CaptureError, Frame};

/// An opened capture handle.
pub trait CaptureBackend: Send {
    /// Next frame, `Ok(None)` once the source is exhausted.
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Best-effort native frame rate, `None` when unknown.
    fn nominal_fps(&self) -> Option<f64>;

    /// Free backend resources. Called exactly once by [`FrameSource`].
    fn release(&mut self);
}

/// Opens capture backends for a [`PlaybackConfig`].
///
/// Shared between the controller and every producer thread it spawns.
pub trait SourceFactory: Send + Sync {
    fn open(&self, config: &PlaybackConfig) -> Result<Box<dyn CaptureBackend>, CaptureError>;
}

/// Dispatches on [`BackendHint`] to the backends compiled into this build.
#[derive(Debug, Clone, Default)]
pub struct DefaultSourceFactory {
    pub pattern: PatternConfig,
}

impl DefaultSourceFactory {
    pub fn new(pattern: PatternConfig) -> Self {
        Self { pattern }
    }

    fn resolve(&self, config: &PlaybackConfig) -> BackendHint {
        match (config.backend, &config.source) {
            (BackendHint::Auto, SourceId::Path(path)) if Path::new(path).is_dir() => {
                BackendHint::ImageSequence
            }
            (BackendHint::Auto, SourceId::Index(_)) if cfg!(feature = "v4l2-capture") => {
                BackendHint::V4l2
            }
            (BackendHint::Auto, _) => BackendHint::GStreamer,
            (hint, _) => hint,
        }
    }
}

impl SourceFactory for DefaultSourceFactory {
    fn open(&self, config: &PlaybackConfig) -> Result<Box<dyn CaptureBackend>, CaptureError> {
        let backend = self.resolve(config);
        debug!(%backend, source = %config.source, "opening capture backend");

        match backend {
            BackendHint::TestPattern => Ok(Box::new(PatternBackend::open(config, &self.pattern))),
            BackendHint::ImageSequence => Ok(Box::new(SequenceBackend::open(config)?)),
            #[cfg(feature = "v4l2-capture")]
            BackendHint::V4l2 => Ok(Box::new(super::v4l2::V4l2Capture::open(config)?)),
            #[cfg(feature = "gstreamer-pipeline")]
            BackendHint::GStreamer => Ok(Box::new(super::gst_capture::GstCapture::open(config)?)),
            other => Err(CaptureError::unavailable(
                &config.source,
                format!("backend '{other}' is not compiled into this build"),
            )),
        }
    }
}

/// Owns one backend handle and guarantees it is released exactly once.
///
/// Read failures are folded into end-of-stream: callers only ever see a
/// frame or `None`.
pub struct FrameSource {
    backend: Box<dyn CaptureBackend>,
    released: bool,
    read_retries: u32,
    sequence: u64,
    source_id: String,
}

impl FrameSource {
    /// Open a backend for `config`, applying its size and offset hints.
    #[instrument(skip_all, fields(source = %config.source, offset = config.frame_number))]
    pub fn open(
        config: &PlaybackConfig,
        factory: &dyn SourceFactory,
    ) -> Result<Self, CaptureError> {
        let backend = factory.open(config)?;
        info!("Capture source opened");

        Ok(Self {
            backend,
            released: false,
            read_retries: 0,
            sequence: 0,
            source_id: config.source.to_string(),
        })
    }

    /// Tolerate this many consecutive failed reads before ending the stream.
    pub fn with_read_retries(mut self, read_retries: u32) -> Self {
        self.read_retries = read_retries;
        self
    }

    /// Next frame, or `None` once the source is exhausted or has failed.
    pub fn read(&mut self) -> Option<Frame> {
        if self.released {
            return None;
        }

        let mut failures = 0;
        loop {
            match self.backend.read() {
                Ok(Some(frame)) => {
                    self.sequence += 1;
                    metrics::counter!("frames_captured").increment(1);
                    return Some(frame.with_sequence(self.sequence));
                }
                Ok(None) => {
                    debug!(source = %self.source_id, frames = self.sequence, "end of stream");
                    return None;
                }
                Err(err) if failures < self.read_retries => {
                    failures += 1;
                    warn!(source = %self.source_id, %err, attempt = failures, "frame read failed, retrying");
                }
                Err(err) => {
                    warn!(source = %self.source_id, %err, "frame read failed, ending stream");
                    return None;
                }
            }
        }
    }

    /// Native frame rate, falling back to 1 when the backend reports
    /// nothing usable.
    pub fn nominal_fps(&self) -> f64 {
        match self.backend.nominal_fps() {
            Some(fps) if fps.is_finite() && fps > 0.0 => fps,
            _ => 1.0,
        }
    }

    /// Frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.sequence
    }

    /// Release the backend. Later calls and reads are no-ops.
    pub fn close(&mut self) {
        if !self.released {
            self.released = true;
            self.backend.release();
            debug!(source = %self.source_id, "capture source released");
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Yields `frames` frames, then fails `failures` times, then ends.
    struct Scripted {
        frames: usize,
        failures: usize,
        released: Arc<AtomicUsize>,
    }

    impl CaptureBackend for Scripted {
        fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
            if self.frames > 0 {
                self.frames -= 1;
                return Ok(Some(Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Bgr24)?));
            }
            if self.failures > 0 {
                self.failures -= 1;
                return Err(CaptureError::Read("device hiccup".into()));
            }
            Ok(None)
        }

        fn nominal_fps(&self) -> Option<f64> {
            Some(0.0)
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn source(frames: usize, failures: usize) -> (FrameSource, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let source = FrameSource {
            backend: Box::new(Scripted {
                frames,
                failures,
                released: released.clone(),
            }),
            released: false,
            read_retries: 0,
            sequence: 0,
            source_id: "scripted".into(),
        };
        (source, released)
    }

    #[test]
    fn failed_read_ends_the_stream() {
        let (mut source, _) = source(2, 1);
        assert_eq!(source.read().unwrap().meta.sequence, 1);
        assert_eq!(source.read().unwrap().meta.sequence, 2);
        assert!(source.read().is_none());
    }

    #[test]
    fn retries_absorb_transient_failures() {
        let (source, _) = source(1, 2);
        let mut source = source.with_read_retries(2);
        assert!(source.read().is_some());
        assert!(source.read().is_none());
        assert_eq!(source.frames_read(), 1);
    }

    #[test]
    fn release_happens_once_after_close_and_drop() {
        let (mut source, released) = source(1, 1);
        source.read();
        source.read();
        source.close();
        source.close();
        assert!(source.read().is_none());
        drop(source);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_happens_on_drop_alone() {
        let (source, released) = source(0, 0);
        drop(source);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_frame_rate_falls_back_to_one() {
        let (source, _) = source(0, 0);
        assert_eq!(source.nominal_fps(), 1.0);
    }

    #[test]
    fn missing_backends_report_unavailable() {
        let factory = DefaultSourceFactory::default();
        let config = PlaybackConfig::new(SourceId::Index(3), BackendHint::GStreamer);
        if cfg!(feature = "gstreamer-pipeline") {
            return;
        }
        match factory.open(&config) {
            Err(CaptureError::Unavailable { source_id, .. }) => {
                assert_eq!(source_id, "device #3")
            }
            other => panic!("expected unavailable, got {:?}", other.map(|_| ())),
        }
    }
}
