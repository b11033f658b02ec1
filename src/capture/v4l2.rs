//! V4L2 device capture with memory-mapped buffers.
//!
//! The requested size is negotiated with the driver and silently clamped to
//! whatever mode it picks. Devices cannot seek, so the starting offset is
//! ignored.

use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use tracing::{debug, info, instrument};

use crate::{PlaybackConfig, SourceId};

use super::decoder::{decode_frame, WireFormat};
use super::{CaptureBackend, CaptureError, Frame, PixelFormat};

const BUFFER_COUNT: u32 = 4;

pub struct V4l2Capture {
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
    format: WireFormat,
    width: u32,
    height: u32,
    fps: Option<f64>,
}

impl V4l2Capture {
    #[instrument(skip_all, fields(source = %config.source))]
    pub fn open(config: &PlaybackConfig) -> Result<Self, CaptureError> {
        let unavailable = |err: std::io::Error| CaptureError::unavailable(&config.source, err);

        let device = match &config.source {
            SourceId::Index(index) => Device::new(*index as usize),
            SourceId::Path(path) => Device::with_path(path),
        }
        .map_err(unavailable)?;

        let caps = device.query_caps().map_err(unavailable)?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::unavailable(
                &config.source,
                "device doesn't support video capture",
            ));
        }

        // Prefer MJPEG, fall back to YUYV
        let mut fmt = device.format().map_err(unavailable)?;
        if let Some(width) = config.width {
            fmt.width = width;
        }
        if let Some(height) = config.height {
            fmt.height = height;
        }
        fmt.fourcc = FourCC::new(b"MJPG");
        let mut fmt = device.set_format(&fmt).map_err(unavailable)?;
        if fmt.fourcc != FourCC::new(b"MJPG") {
            fmt.fourcc = FourCC::new(b"YUYV");
            fmt = device.set_format(&fmt).map_err(unavailable)?;
        }

        let format = if fmt.fourcc == FourCC::new(b"MJPG") {
            WireFormat::Mjpeg
        } else if fmt.fourcc == FourCC::new(b"YUYV") {
            WireFormat::Yuyv
        } else {
            return Err(CaptureError::Unsupported(format!(
                "device pixel format {}",
                fmt.fourcc
            )));
        };

        let fps = device.params().ok().and_then(|params| {
            let interval = params.interval;
            (interval.numerator > 0).then(|| interval.denominator as f64 / interval.numerator as f64)
        });

        if config.frame_number > 0 {
            debug!(
                offset = config.frame_number,
                "V4L2 devices cannot seek, starting offset ignored"
            );
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(unavailable)?;
        info!(
            "Capture stream started: {}x{} {:?} @ {:?} fps",
            fmt.width, fmt.height, format, fps
        );

        Ok(Self {
            stream: Some(stream),
            device: Some(device),
            format,
            width: fmt.width,
            height: fmt.height,
            fps,
        })
    }
}

impl CaptureBackend for V4l2Capture {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let (buf, meta) = stream
            .next()
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        let used = (meta.bytesused as usize).min(buf.len());

        let decoded = decode_frame(&buf[..used], self.format, self.width, self.height)?;
        Frame::new(
            decoded.pixels,
            decoded.width,
            decoded.height,
            PixelFormat::Bgr24,
        )
        .map(Some)
    }

    fn nominal_fps(&self) -> Option<f64> {
        self.fps
    }

    fn release(&mut self) {
        // Stream first: it unmaps buffers owned by the device
        self.stream.take();
        self.device.take();
    }
}
