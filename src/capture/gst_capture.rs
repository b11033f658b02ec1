//! GStreamer capture for files, URIs and devices.
//!
//! Everything is decoded and converted to BGR inside the pipeline. The size
//! hint becomes a `videoscale` caps filter; the starting offset becomes a
//! flushing seek once the pipeline has prerolled.

use std::path::Path;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, info, instrument, warn};

use crate::{PlaybackConfig, SourceId};

use super::{CaptureBackend, CaptureError, Frame, PixelFormat};

const PREROLL_TIMEOUT_SECS: u64 = 5;

pub struct GstCapture {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    fps: Option<f64>,
    position: u64,
    released: bool,
}

impl GstCapture {
    #[instrument(skip_all, fields(source = %config.source))]
    pub fn open(config: &PlaybackConfig) -> Result<Self, CaptureError> {
        let unavailable = |reason: String| CaptureError::unavailable(&config.source, reason);

        gst::init().map_err(|e| unavailable(format!("failed to initialize GStreamer: {e}")))?;

        let pipeline_str = Self::build_pipeline_string(config)?;
        info!("Pipeline: {}", pipeline_str);

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| unavailable(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| unavailable("failed to create pipeline".into()))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| unavailable("failed to find appsink element".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| unavailable("failed to cast to AppSink".into()))?;

        appsink.set_property("emit-signals", false);
        appsink.set_property("sync", false);

        let mut capture = Self {
            pipeline,
            appsink,
            fps: None,
            position: config.frame_number,
            released: false,
        };

        capture.preroll().map_err(|e| unavailable(e.to_string()))?;
        capture.fps = capture.negotiated_fps();
        if config.frame_number > 0 {
            capture.seek_to(config.frame_number);
        }
        capture
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| unavailable(format!("failed to start pipeline: {e:?}")))?;

        Ok(capture)
    }

    fn build_pipeline_string(config: &PlaybackConfig) -> Result<String, CaptureError> {
        let source = match &config.source {
            SourceId::Index(index) => format!("v4l2src device=/dev/video{index}"),
            SourceId::Path(path) if path.contains("://") => format!("uridecodebin uri=\"{path}\""),
            SourceId::Path(path) => {
                let uri = gst::glib::filename_to_uri(Path::new(path), None)
                    .map_err(|e| CaptureError::unavailable(&config.source, e))?;
                format!("uridecodebin uri=\"{uri}\"")
            }
        };

        let mut caps = String::from("video/x-raw,format=BGR");
        if let Some(width) = config.width {
            caps.push_str(&format!(",width={width}"));
        }
        if let Some(height) = config.height {
            caps.push_str(&format!(",height={height}"));
        }

        Ok(format!(
            "{source} ! videoconvert ! videoscale ! {caps} ! appsink name=appsink"
        ))
    }

    fn preroll(&self) -> Result<(), CaptureError> {
        self.pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| CaptureError::Read(format!("failed to preroll pipeline: {e:?}")))?;

        let (result, _, _) = self
            .pipeline
            .state(Some(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS)));
        match result {
            Ok(gst::StateChangeSuccess::Success) | Ok(gst::StateChangeSuccess::NoPreroll) => Ok(()),
            Ok(gst::StateChangeSuccess::Async) => {
                debug!("Pipeline still prerolling");
                Ok(())
            }
            Err(e) => Err(CaptureError::Read(format!("pipeline failed to preroll: {e:?}"))),
        }
    }

    fn negotiated_fps(&self) -> Option<f64> {
        let caps = self.appsink.static_pad("sink")?.current_caps()?;
        let info = gst_video::VideoInfo::from_caps(&caps).ok()?;
        let fps = info.fps();
        (fps.numer() > 0 && fps.denom() > 0).then(|| fps.numer() as f64 / fps.denom() as f64)
    }

    fn seek_to(&self, frame_number: u64) {
        let Some(fps) = self.fps else {
            warn!("Unknown frame rate, starting offset ignored");
            return;
        };
        let target = gst::ClockTime::from_nseconds((frame_number as f64 / fps * 1e9) as u64);
        if let Err(e) = self
            .pipeline
            .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE, target)
        {
            warn!("Seek to frame {} failed: {}", frame_number, e);
        }
    }
}

impl CaptureBackend for GstCapture {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released {
            return Ok(None);
        }

        let sample = match self.appsink.pull_sample() {
            Ok(sample) => sample,
            Err(_) if self.appsink.is_eos() => return Ok(None),
            Err(_) => return Err(CaptureError::Read("failed to pull sample".into())),
        };

        let buffer = sample
            .buffer()
            .ok_or_else(|| CaptureError::Read("sample contains no buffer".into()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| CaptureError::Read("sample has no caps".into()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|_| CaptureError::Read("failed to parse video info from caps".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| CaptureError::Read("failed to map buffer".into()))?;

        // Rows may be padded; repack tightly
        let (width, height) = (info.width(), info.height());
        let stride = info.stride()[0] as usize;
        let row = width as usize * 3;
        let data = map.as_slice();
        let mut pixels = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let line = data
                .get(start..start + row)
                .ok_or_else(|| CaptureError::Read("buffer shorter than caps".into()))?;
            pixels.extend_from_slice(line);
        }

        let frame =
            Frame::new(pixels, width, height, PixelFormat::Bgr24)?.with_position(self.position);
        self.position += 1;
        Ok(Some(frame))
    }

    fn nominal_fps(&self) -> Option<f64> {
        self.fps
    }

    fn release(&mut self) {
        self.released = true;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Failed to stop pipeline: {:?}", e);
        }
    }
}
