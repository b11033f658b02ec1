//! UI-side playback state machine.
//!
//! Everything here runs on the host's event-loop thread and never blocks on
//! the producer except for the bounded teardown wait in `pause`/`reset`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::capture::{FrameSource, SourceFactory};
use crate::display::{Compositor, Geometry, RenderableImage};
use crate::pipeline::{channel, FrameMessage, FrameProducer, FrameReceiver, ProducerHandle, Teardown};
use crate::{Frame, PipelineConfig, PlaybackConfig, SourceId};

/// Host toolkit collaborator owning the visible region.
pub trait DisplaySurface {
    /// Current size of the display region.
    fn geometry(&self) -> Geometry;

    /// Replace the shown image. `None` clears it.
    fn present(&mut self, image: Option<RenderableImage>);

    /// Advisory play/pause feedback.
    fn notify(&mut self, _event: PlaybackEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Paused,
}

pub struct PlaybackController<S: DisplaySurface> {
    config: PlaybackConfig,
    factory: Arc<dyn SourceFactory>,
    surface: S,
    compositor: Compositor,
    teardown_timeout: Duration,
    read_retries: u32,

    status: PlaybackStatus,
    frame_number: u64,
    latest_frame: Option<Frame>,
    display_dirty: bool,
    ended: bool,
    receiver: Option<FrameReceiver>,
    producer: Option<ProducerHandle>,
}

impl<S: DisplaySurface> PlaybackController<S> {
    pub fn new(
        config: PlaybackConfig,
        pipeline: &PipelineConfig,
        factory: Arc<dyn SourceFactory>,
        surface: S,
    ) -> Self {
        let mut controller = Self {
            frame_number: config.frame_number,
            config,
            factory,
            surface,
            compositor: Compositor::default(),
            teardown_timeout: Duration::from_millis(pipeline.teardown_timeout_ms),
            read_retries: pipeline.read_retries,
            status: PlaybackStatus::Stopped,
            latest_frame: None,
            display_dirty: false,
            ended: false,
            receiver: None,
            producer: None,
        };

        if pipeline.preview_first_frame && matches!(controller.config.source, SourceId::Path(_)) {
            controller.load_preview();
        }
        controller
    }

    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// Show the first frame of a file before playback starts.
    fn load_preview(&mut self) {
        let config = self.config.with_frame_number(self.frame_number);
        match FrameSource::open(&config, self.factory.as_ref()) {
            Ok(mut source) => {
                if let Some(frame) = source.read() {
                    self.latest_frame = Some(frame);
                    self.display_dirty = true;
                }
                source.close();
            }
            Err(err) => debug!(%err, "No preview frame"),
        }
    }

    /// Start (or resume) playback from the current frame number.
    pub fn play(&mut self) {
        if self.producer.is_some() {
            return;
        }

        let config = self.config.with_frame_number(self.frame_number);
        let (sender, receiver) = channel();
        let producer = FrameProducer::new(config, self.factory.clone())
            .with_read_retries(self.read_retries);

        match producer.spawn(sender) {
            Ok(handle) => {
                info!(source = %self.config.source, from = self.frame_number, "Playback started");
                self.producer = Some(handle);
                self.receiver = Some(receiver);
                self.ended = false;
                self.status = PlaybackStatus::Playing;
                self.surface.notify(PlaybackEvent::Started);
            }
            Err(err) => {
                error!(%err, "Failed to spawn producer thread");
                self.ended = true;
            }
        }
    }

    /// Stop the producer, keeping the frame number for a later resume.
    pub fn pause(&mut self) {
        if self.producer.is_none() {
            return;
        }
        self.surface.notify(PlaybackEvent::Paused);
        self.stop_producer();
        self.status = PlaybackStatus::Paused;
        info!(at = self.frame_number, "Playback paused");
    }

    pub fn toggle(&mut self) {
        if self.producer.is_none() {
            self.play();
        } else {
            self.pause();
        }
    }

    /// Stop the producer and rewind to the first frame.
    pub fn reset(&mut self) {
        self.pause();
        self.frame_number = 0;
        self.status = PlaybackStatus::Stopped;
        info!("Playback reset");
    }

    fn stop_producer(&mut self) {
        // Closing the transport first makes any in-flight send fail fast
        if let Some((sent, received)) = self.channel_stats() {
            debug!(sent, received, "Closing frame channel");
        }
        self.receiver = None;
        if let Some(handle) = self.producer.take() {
            match handle.stop(self.teardown_timeout) {
                Teardown::Clean => debug!("Producer stopped"),
                Teardown::TimedOut => warn!(
                    timeout = ?self.teardown_timeout,
                    "Producer teardown timed out, thread detached"
                ),
            }
        }
    }

    /// Geometry-invalidation callback for the host toolkit.
    pub fn invalidate(&mut self) {
        self.display_dirty = true;
    }

    /// Drain every queued message, then redraw if anything changed.
    ///
    /// Returns false once the current stream has ended. Never blocks.
    pub fn update(&mut self) -> bool {
        if !self.ended {
            if let Some(receiver) = self.receiver.as_ref() {
                for message in receiver.drain() {
                    match message {
                        FrameMessage::Frame(frame) => {
                            self.frame_number += 1;
                            self.latest_frame = Some(frame);
                            self.display_dirty = true;
                            metrics::counter!("frames_delivered").increment(1);
                        }
                        FrameMessage::EndOfStream => {
                            self.ended = true;
                            break;
                        }
                    }
                }

                if !self.ended && receiver.is_finished() {
                    warn!("Producer exited without end-of-stream");
                    self.ended = true;
                }
                if self.ended {
                    let (sent, received) = receiver.stats();
                    info!(frames = self.frame_number, sent, received, "Stream ended");
                }
            }
        }

        if self.display_dirty {
            self.refresh();
        }
        !self.ended
    }

    fn refresh(&mut self) {
        self.display_dirty = false;
        let image = self.latest_frame.as_ref().and_then(|frame| {
            self.compositor
                .render(frame, self.surface.geometry(), self.config.flipped)
                .map_err(|err| warn!(%err, "Failed to render frame"))
                .ok()
        });
        self.surface.present(image);
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    /// Frames delivered so far, including the starting offset.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn is_dirty(&self) -> bool {
        self.display_dirty
    }

    /// (sent, received) message counts of the live channel, if playing.
    pub fn channel_stats(&self) -> Option<(u64, u64)> {
        self.receiver.as_ref().map(FrameReceiver::stats)
    }

    pub fn latest_frame(&self) -> Option<&Frame> {
        self.latest_frame.as_ref()
    }

    /// The record needed to recreate this playback elsewhere.
    pub fn snapshot(&self) -> PlaybackConfig {
        self.config.with_frame_number(self.frame_number)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

impl<S: DisplaySurface> Drop for PlaybackController<S> {
    fn drop(&mut self) {
        self.stop_producer();
    }
}
