//! Frame producer thread and its lifecycle handle.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{RecvTimeoutError, TryRecvError};
use tracing::{debug, info, warn};

use crate::capture::{FrameSource, SourceFactory};
use crate::PlaybackConfig;

use super::channel::{FrameMessage, FrameSender};
use super::pacing::Pacer;

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The thread exited and released its source.
    Clean,
    /// The thread did not exit in time and was detached.
    TimedOut,
}

/// Cooperative stop request seen from inside the producer thread.
struct StopSignal(flume::Receiver<()>);

impl StopSignal {
    fn is_requested(&self) -> bool {
        matches!(self.0.try_recv(), Ok(()) | Err(TryRecvError::Disconnected))
    }

    /// Sleep for `wait` unless a stop arrives first. Returns true on stop.
    fn sleep(&self, wait: Duration) -> bool {
        !matches!(self.0.recv_timeout(wait), Err(RecvTimeoutError::Timeout))
    }
}

/// Reads frames from a freshly opened source and pushes them into a channel.
///
/// Built from plain data only, so it can be recreated for every play.
pub struct FrameProducer {
    config: PlaybackConfig,
    factory: Arc<dyn SourceFactory>,
    read_retries: u32,
}

impl FrameProducer {
    pub fn new(config: PlaybackConfig, factory: Arc<dyn SourceFactory>) -> Self {
        Self {
            config,
            factory,
            read_retries: 0,
        }
    }

    pub fn with_read_retries(mut self, read_retries: u32) -> Self {
        self.read_retries = read_retries;
        self
    }

    /// Start the read loop on its own thread.
    pub fn spawn(self, sender: FrameSender) -> std::io::Result<ProducerHandle> {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let (done_tx, done_rx) = flume::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("frame-producer".into())
            .spawn(move || {
                // Dropped last, after the source has been released
                let _done = done_tx;
                self.run(sender, StopSignal(stop_rx));
            })?;

        Ok(ProducerHandle {
            thread: Some(thread),
            stop: Some(stop_tx),
            done: done_rx,
        })
    }

    fn run(self, sender: FrameSender, stop: StopSignal) {
        let mut source = match FrameSource::open(&self.config, self.factory.as_ref()) {
            Ok(source) => source.with_read_retries(self.read_retries),
            Err(err) => {
                warn!(%err, "Capture source unavailable");
                let _ = sender.send(FrameMessage::EndOfStream);
                return;
            }
        };

        let mut pacer = self
            .config
            .pace_to_fps
            .then(|| Pacer::new(source.nominal_fps(), Instant::now()));
        if let Some(pacer) = &pacer {
            debug!(interval = ?pacer.interval(), "Pacing to source frame rate");
        }

        loop {
            if stop.is_requested() {
                debug!("Stop requested");
                break;
            }

            match source.read() {
                Some(frame) => {
                    if sender.send(FrameMessage::Frame(frame)).is_err() {
                        debug!("Consumer closed the channel");
                        break;
                    }
                }
                None => {
                    let _ = sender.send(FrameMessage::EndOfStream);
                    break;
                }
            }

            if let Some(pacer) = pacer.as_mut() {
                if let Some(wait) = pacer.advance(Instant::now()) {
                    if stop.sleep(wait) {
                        debug!("Stop requested while pacing");
                        break;
                    }
                }
            }
        }

        info!(frames = source.frames_read(), "Producer exiting");
        source.close();
    }
}

/// Controller-side handle to a running producer thread.
pub struct ProducerHandle {
    thread: Option<JoinHandle<()>>,
    stop: Option<flume::Sender<()>>,
    done: flume::Receiver<()>,
}

impl ProducerHandle {
    /// Whether the producer thread has torn down.
    pub fn is_finished(&self) -> bool {
        self.done.is_disconnected()
    }

    /// Ask the thread to stop and wait up to `timeout` for it to release its
    /// source. A thread stuck in a backend call is detached.
    pub fn stop(mut self, timeout: Duration) -> Teardown {
        self.stop.take();

        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "Producer did not exit in time, detaching thread");
                self.thread.take();
                Teardown::TimedOut
            }
            _ => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        warn!("Producer thread panicked");
                    }
                }
                Teardown::Clean
            }
        }
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        // Not stopped explicitly: signal and detach
        self.stop.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureBackend, CaptureError, DefaultSourceFactory};
    use crate::pipeline::channel;
    use crate::{BackendHint, Frame, PatternConfig, PixelFormat, SourceId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pattern_factory(frame_count: Option<u64>, fps: f64) -> Arc<dyn SourceFactory> {
        Arc::new(DefaultSourceFactory::new(PatternConfig { frame_count, fps }))
    }

    fn pattern_config(pace_to_fps: bool) -> PlaybackConfig {
        PlaybackConfig {
            width: Some(8),
            height: Some(6),
            pace_to_fps,
            ..PlaybackConfig::new(SourceId::Index(0), BackendHint::TestPattern)
        }
    }

    fn collect(rx: &channel::FrameReceiver, deadline: Duration) -> (Vec<u64>, bool) {
        let start = Instant::now();
        let mut positions = Vec::new();
        while start.elapsed() < deadline {
            for message in rx.drain() {
                match message {
                    FrameMessage::Frame(frame) => positions.push(frame.meta.position.unwrap()),
                    FrameMessage::EndOfStream => return (positions, true),
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
        (positions, false)
    }

    #[test]
    fn delivers_every_frame_then_end_of_stream() {
        let (tx, rx) = channel::channel();
        let handle = FrameProducer::new(pattern_config(false), pattern_factory(Some(10), 30.0))
            .spawn(tx)
            .unwrap();

        let (positions, ended) = collect(&rx, Duration::from_secs(5));
        assert!(ended);
        assert_eq!(positions, (0..10).collect::<Vec<_>>());
        assert_eq!(handle.stop(Duration::from_secs(1)), Teardown::Clean);
        assert!(rx.try_receive().is_none());
    }

    #[test]
    fn starts_from_the_configured_offset() {
        let (tx, rx) = channel::channel();
        let config = pattern_config(false).with_frame_number(7);
        let _handle = FrameProducer::new(config, pattern_factory(Some(10), 30.0))
            .spawn(tx)
            .unwrap();

        let (positions, ended) = collect(&rx, Duration::from_secs(5));
        assert!(ended);
        assert_eq!(positions, vec![7, 8, 9]);
    }

    struct Unavailable;

    impl SourceFactory for Unavailable {
        fn open(&self, config: &PlaybackConfig) -> Result<Box<dyn CaptureBackend>, CaptureError> {
            Err(CaptureError::unavailable(&config.source, "device busy"))
        }
    }

    #[test]
    fn open_failure_is_an_immediate_end_of_stream() {
        let (tx, rx) = channel::channel();
        let handle = FrameProducer::new(pattern_config(false), Arc::new(Unavailable))
            .spawn(tx)
            .unwrap();

        let (positions, ended) = collect(&rx, Duration::from_secs(5));
        assert!(positions.is_empty());
        assert!(ended);
        assert_eq!(handle.stop(Duration::from_secs(1)), Teardown::Clean);
    }

    #[test]
    fn pacing_tracks_the_nominal_rate() {
        let (tx, rx) = channel::channel();
        let handle = FrameProducer::new(pattern_config(true), pattern_factory(None, 50.0))
            .spawn(tx)
            .unwrap();

        thread::sleep(Duration::from_millis(400));
        let delivered = rx.drain().count();
        assert_eq!(handle.stop(Duration::from_secs(1)), Teardown::Clean);

        // 50 fps over 400ms is ~20 frames
        assert!(
            (12..=28).contains(&delivered),
            "delivered {delivered} frames"
        );
    }

    #[test]
    fn stop_interrupts_a_long_pacing_sleep() {
        let (tx, _rx) = channel::channel();
        let handle = FrameProducer::new(pattern_config(true), pattern_factory(None, 0.2))
            .spawn(tx)
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        assert_eq!(handle.stop(Duration::from_secs(2)), Teardown::Clean);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn dropping_the_receiver_ends_the_producer() {
        let (tx, rx) = channel::channel();
        let handle = FrameProducer::new(pattern_config(false), pattern_factory(None, 30.0))
            .spawn(tx)
            .unwrap();
        drop(rx);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_finished());
    }

    /// Blocks in `read` until released from the outside.
    struct Hanging {
        gate: flume::Receiver<()>,
        released: Arc<AtomicUsize>,
    }

    impl CaptureBackend for Hanging {
        fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
            let _ = self.gate.recv();
            Ok(Some(Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Bgr24)?))
        }

        fn nominal_fps(&self) -> Option<f64> {
            None
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct HangingFactory {
        gate: flume::Receiver<()>,
        released: Arc<AtomicUsize>,
    }

    impl SourceFactory for HangingFactory {
        fn open(&self, _: &PlaybackConfig) -> Result<Box<dyn CaptureBackend>, CaptureError> {
            Ok(Box::new(Hanging {
                gate: self.gate.clone(),
                released: self.released.clone(),
            }))
        }
    }

    #[test]
    fn hung_backend_times_out_and_is_detached() {
        let (gate_tx, gate_rx) = flume::unbounded();
        let released = Arc::new(AtomicUsize::new(0));
        let factory = Arc::new(HangingFactory {
            gate: gate_rx,
            released: released.clone(),
        });

        let (tx, _rx) = channel::channel();
        let handle = FrameProducer::new(pattern_config(false), factory)
            .spawn(tx)
            .unwrap();
        thread::sleep(Duration::from_millis(20));

        assert_eq!(handle.stop(Duration::from_millis(50)), Teardown::TimedOut);

        // The detached thread still releases its source once unblocked
        drop(gate_tx);
        let deadline = Instant::now() + Duration::from_secs(5);
        while released.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
