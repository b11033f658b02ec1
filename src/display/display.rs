//! SDL2 Window Display Module
//! Hosts the playback controller's output in a resizable SDL2 window and
//! translates window/keyboard events into host commands.

use color_eyre::{eyre::eyre, Result};
use sdl2::event::{Event, WindowEvent};
use sdl2::keyboard::Scancode;
use sdl2::pixels::{Color, PixelFormatEnum};
use sdl2::rect::Rect;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;
use tracing::{error, info};

use crate::display::{Geometry, RenderableImage};
use crate::playback::{DisplaySurface, PlaybackEvent};
use crate::DisplayConfig;

/// SDL2 window acting as the display surface.
/// The current image is letterboxed in the middle of the window.
pub struct Sdl2Display {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    title: String,
    image: Option<RenderableImage>,
}

impl Sdl2Display {
    pub fn new(sdl_context: &sdl2::Sdl, config: &DisplayConfig) -> Result<Self> {
        let video_subsystem = sdl_context.video().map_err(|e| eyre!(e))?;

        let mut window = video_subsystem
            .window(&config.title, config.width, config.height)
            .position_centered()
            .resizable()
            .build()?;
        window.set_minimum_size(config.min_width, config.min_height)?;

        let canvas = window.into_canvas().present_vsync().build()?;
        let texture_creator = canvas.texture_creator();

        Ok(Self {
            canvas,
            texture_creator,
            title: config.title.clone(),
            image: None,
        })
    }

    /// Redraw the current image, or a blank window when there is none.
    pub fn redraw(&mut self) -> Result<()> {
        self.canvas.set_draw_color(Color::BLACK);
        self.canvas.clear();

        if let Some(image) = &self.image {
            let mut texture = self
                .texture_creator
                .create_texture_streaming(PixelFormatEnum::RGBA32, image.width, image.height)
                .map_err(|e| eyre!(e))?;

            texture
                .update(None, &image.pixels, image.pitch())
                .map_err(|e| eyre!(e))?;

            let geometry = self.geometry();
            let x = (geometry.width.saturating_sub(image.width) / 2) as i32;
            let y = (geometry.height.saturating_sub(image.height) / 2) as i32;
            self.canvas
                .copy(&texture, None, Some(Rect::new(x, y, image.width, image.height)))
                .map_err(|e| eyre!(e))?;
        }

        self.canvas.present();
        Ok(())
    }
}

impl DisplaySurface for Sdl2Display {
    fn geometry(&self) -> Geometry {
        let (width, height) = self
            .canvas
            .output_size()
            .unwrap_or_else(|_| self.canvas.window().size());
        Geometry::new(width, height)
    }

    fn present(&mut self, image: Option<RenderableImage>) {
        self.image = image;
        if let Err(e) = self.redraw() {
            error!("Display error: {}", e);
        }
    }

    fn notify(&mut self, event: PlaybackEvent) {
        let title = match event {
            PlaybackEvent::Started => self.title.clone(),
            PlaybackEvent::Paused => format!("{} (paused)", self.title),
        };
        if let Err(e) = self.canvas.window_mut().set_title(&title) {
            error!("Failed to set window title: {}", e);
        }
    }
}

/// What the host loop should do in response to user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Quit,
    TogglePlayback,
    Reset,
    /// The display region changed size or needs repainting
    Invalidate,
}

pub struct Sdl2Input {
    event_pump: EventPump,
}

impl Sdl2Input {
    pub fn new(sdl_context: &sdl2::Sdl) -> Result<Self> {
        let event_pump = sdl_context.event_pump().map_err(|e| eyre!(e))?;
        Ok(Self { event_pump })
    }

    /// Pending commands, never blocks.
    pub fn poll(&mut self) -> Vec<HostCommand> {
        let mut commands = Vec::new();
        for event in self.event_pump.poll_iter() {
            let command = match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    scancode: Some(Scancode::Escape),
                    ..
                } => {
                    info!("Quit event received");
                    HostCommand::Quit
                }
                Event::KeyDown {
                    scancode: Some(Scancode::Space),
                    repeat: false,
                    ..
                } => HostCommand::TogglePlayback,
                Event::KeyDown {
                    scancode: Some(Scancode::R),
                    repeat: false,
                    ..
                } => HostCommand::Reset,
                Event::Window {
                    win_event:
                        WindowEvent::Resized(..) | WindowEvent::SizeChanged(..) | WindowEvent::Exposed,
                    ..
                } => HostCommand::Invalidate,
                _ => continue,
            };
            commands.push(command);
        }
        commands
    }
}
