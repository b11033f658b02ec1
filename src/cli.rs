use std::path::PathBuf;

use clap::Parser;

use crate::{BackendHint, Settings};

#[derive(Debug, Parser)]
#[command(
    name = "framelatch",
    about = "Play a camera, video file or image sequence in a resizable window",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Device index, file path, directory of frames or URI
    pub source: Option<String>,

    /// Capture backend: auto, v4l2, gstreamer, image-sequence, test-pattern
    #[arg(short = 'b', long = "backend", value_parser = parse_backend)]
    pub backend: Option<BackendHint>,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Mirror frames horizontally
    #[arg(long = "flip")]
    pub flip: bool,

    /// Requested capture width
    #[arg(long = "width")]
    pub width: Option<u32>,

    /// Requested capture height
    #[arg(long = "height")]
    pub height: Option<u32>,

    /// Throttle delivery to the source's frame rate
    #[arg(long = "pace")]
    pub pace: bool,

    /// Frame to start from
    #[arg(long = "start-frame")]
    pub start_frame: Option<u64>,

    /// Open paused instead of playing immediately
    #[arg(long = "paused")]
    pub paused: bool,

    /// Tracing filter, e.g. `framelatch=debug`
    #[arg(long = "log", default_value = "framelatch=info")]
    pub log: String,
}

fn parse_backend(value: &str) -> Result<BackendHint, String> {
    value.parse().map_err(|err: crate::CaptureError| err.to_string())
}

impl CliArgs {
    /// Fold command-line overrides into loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        let playback = &mut settings.playback;
        if let Some(source) = &self.source {
            playback.source = source.parse().unwrap_or_else(|never| match never {});
        }
        if let Some(backend) = self.backend {
            playback.backend = backend;
        }
        if self.flip {
            playback.flipped = true;
        }
        if self.width.is_some() {
            playback.width = self.width;
        }
        if self.height.is_some() {
            playback.height = self.height;
        }
        if self.pace {
            playback.pace_to_fps = true;
        }
        if let Some(start) = self.start_frame {
            playback.frame_number = start;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceId;

    #[test]
    fn flags_override_settings() {
        let args = CliArgs::try_parse_from([
            "framelatch",
            "clip.avi",
            "--backend",
            "gstreamer",
            "--flip",
            "--width",
            "1920",
            "--pace",
            "--start-frame",
            "12",
        ])
        .unwrap();

        let mut settings = Settings::default();
        args.apply(&mut settings);
        let playback = &settings.playback;
        assert_eq!(playback.source, SourceId::Path("clip.avi".into()));
        assert_eq!(playback.backend, BackendHint::GStreamer);
        assert!(playback.flipped && playback.pace_to_fps);
        assert_eq!((playback.width, playback.height), (Some(1920), None));
        assert_eq!(playback.frame_number, 12);
    }

    #[test]
    fn absent_flags_leave_settings_alone() {
        let args = CliArgs::try_parse_from(["framelatch"]).unwrap();
        let mut settings = Settings::default();
        settings.playback.flipped = true;
        args.apply(&mut settings);
        assert!(settings.playback.flipped);
        assert_eq!(settings.playback.source, SourceId::Index(0));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(CliArgs::try_parse_from(["framelatch", "--backend", "vhs"]).is_err());
    }
}
