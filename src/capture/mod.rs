pub mod decoder;
pub mod error;
pub mod frame;
pub mod pattern;
pub mod sequence;
pub mod source;

#[cfg(feature = "v4l2-capture")]
pub mod v4l2;

#[cfg(feature = "gstreamer-pipeline")]
pub mod gst_capture;

pub use error::CaptureError;
pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use source::{CaptureBackend, DefaultSourceFactory, FrameSource, SourceFactory};
