pub mod capture;
pub mod cli;
pub mod display;
pub mod pipeline;
pub mod playback;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use capture::{CaptureError, Frame, PixelFormat};
pub use display::{Compositor, Geometry, RenderableImage};
pub use playback::{DisplaySurface, PlaybackController, PlaybackEvent, PlaybackStatus};

/// Process-wide settings slot, swapped atomically once loading finishes.
///
/// The playback core never reads this; it is handed explicit values.
pub static SETTINGS: once_cell::sync::Lazy<ArcSwap<Settings>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Settings::default()));

/// Prefix for environment overrides, e.g. `FRAMELATCH_PLAYBACK__FLIPPED=true`.
pub const ENV_PREFIX: &str = "FRAMELATCH";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub playback: PlaybackConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
    pub pattern: PatternConfig,
}

impl Settings {
    /// Layer defaults, an optional TOML file and `FRAMELATCH_*` environment
    /// variables, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

/// Where frames come from. Passed through to the backend unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceId {
    /// Capture device index
    Index(u32),
    /// File path, directory or URI
    Path(String),
}

impl Default for SourceId {
    fn default() -> Self {
        SourceId::Index(0)
    }
}

impl FromStr for SourceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u32>() {
            Ok(index) => SourceId::Index(index),
            Err(_) => SourceId::Path(s.to_string()),
        })
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Index(index) => write!(f, "device #{index}"),
            SourceId::Path(path) => f.write_str(path),
        }
    }
}

/// Which capture backend should open the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendHint {
    #[default]
    Auto,
    V4l2,
    #[serde(rename = "gstreamer", alias = "gst")]
    GStreamer,
    ImageSequence,
    TestPattern,
}

impl BackendHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendHint::Auto => "auto",
            BackendHint::V4l2 => "v4l2",
            BackendHint::GStreamer => "gstreamer",
            BackendHint::ImageSequence => "image-sequence",
            BackendHint::TestPattern => "test-pattern",
        }
    }
}

impl FromStr for BackendHint {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" | "any" => Ok(BackendHint::Auto),
            "v4l2" => Ok(BackendHint::V4l2),
            "gstreamer" | "gst" => Ok(BackendHint::GStreamer),
            "image-sequence" | "sequence" => Ok(BackendHint::ImageSequence),
            "test-pattern" | "pattern" => Ok(BackendHint::TestPattern),
            other => Err(CaptureError::Unsupported(format!("unknown backend '{other}'"))),
        }
    }
}

impl fmt::Display for BackendHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to recreate a producer in a fresh thread.
///
/// Plain data only: no handles, no channel endpoints. `frame_number` is the
/// capture offset the next producer starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub source: SourceId,
    pub backend: BackendHint,
    pub flipped: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pace_to_fps: bool,
    pub frame_number: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            source: SourceId::default(),
            backend: BackendHint::Auto,
            flipped: false,
            width: None,
            height: None,
            pace_to_fps: false,
            frame_number: 0,
        }
    }
}

impl PlaybackConfig {
    pub fn new(source: SourceId, backend: BackendHint) -> Self {
        Self {
            source,
            backend,
            ..Default::default()
        }
    }

    /// Copy of this record reseeded at `frame_number`.
    pub fn with_frame_number(&self, frame_number: u64) -> Self {
        Self {
            frame_number,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
    /// Idle delay between host loop iterations
    pub tick_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: "framelatch".into(),
            width: 800,
            height: 600,
            min_width: 480,
            min_height: 320,
            tick_ms: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded wait for a producer thread to tear down on pause/reset
    pub teardown_timeout_ms: u64,
    /// Consecutive failed reads tolerated before the stream is ended
    pub read_retries: u32,
    /// Show the first frame of a file source before playback starts
    pub preview_first_frame: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            teardown_timeout_ms: 2_000,
            read_retries: 0,
            preview_first_frame: true,
        }
    }
}

/// Synthetic source parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// `None` behaves like a live camera and never ends
    pub frame_count: Option<u64>,
    pub fps: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            frame_count: Some(300),
            fps: 30.0,
        }
    }
}
