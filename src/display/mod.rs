pub mod compositor;

#[cfg(feature = "sdl-display")]
pub mod display;

pub use compositor::{fit_size, Compositor, Geometry, RenderError, RenderableImage};

#[cfg(feature = "sdl-display")]
pub use display::{HostCommand, Sdl2Display, Sdl2Input};
