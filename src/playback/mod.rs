pub mod controller;

pub use controller::{DisplaySurface, PlaybackController, PlaybackEvent, PlaybackStatus};
