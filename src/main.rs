//! framelatch: decoupled video capture and presentation in an SDL2 window

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use framelatch::capture::DefaultSourceFactory;
use framelatch::cli::CliArgs;
use framelatch::display::{HostCommand, Sdl2Display, Sdl2Input};
use framelatch::{PlaybackController, Settings};

/// Owns the event loop and its termination state.
struct Host {
    running: bool,
    stream_alive: bool,
    tick: Duration,
}

impl Host {
    fn run(
        &mut self,
        input: &mut Sdl2Input,
        controller: &mut PlaybackController<Sdl2Display>,
    ) {
        while self.running {
            for command in input.poll() {
                match command {
                    HostCommand::Quit => self.running = false,
                    HostCommand::TogglePlayback => controller.toggle(),
                    HostCommand::Reset => controller.reset(),
                    HostCommand::Invalidate => controller.invalidate(),
                }
            }

            let alive = controller.update();
            if alive != self.stream_alive {
                self.stream_alive = alive;
                if !alive {
                    info!(frames = controller.frame_number(), "Stream finished");
                }
            }

            std::thread::sleep(self.tick);
        }
    }
}

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    let args = CliArgs::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log)),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("framelatch launching...");

    // Load configuration
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    framelatch::SETTINGS.store(Arc::new(settings.clone()));
    info!(
        "Using source {} via {} backend",
        settings.playback.source, settings.playback.backend
    );

    let sdl_context = sdl2::init().map_err(|e| eyre!(e))?;
    let display = Sdl2Display::new(&sdl_context, &settings.display)?;
    let mut input = Sdl2Input::new(&sdl_context)?;

    let factory = Arc::new(DefaultSourceFactory::new(settings.pattern.clone()));
    let mut controller =
        PlaybackController::new(settings.playback, &settings.pipeline, factory, display);
    if !args.paused {
        controller.play();
    }

    let mut host = Host {
        running: true,
        stream_alive: true,
        tick: Duration::from_millis(settings.display.tick_ms),
    };
    host.run(&mut input, &mut controller);

    info!("framelatch shutting down");
    Ok(())
}
