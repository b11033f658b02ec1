//! One-producer, one-consumer frame transport.
//!
//! Unbounded on purpose: there is no application-level backpressure, a
//! producer that outruns the consumer just queues. Dropping the receiver
//! makes every later send fail immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use flume::TryRecvError;

use crate::Frame;

/// What travels from producer to consumer.
#[derive(Debug)]
pub enum FrameMessage {
    Frame(Frame),
    /// No further frames will arrive from this producer.
    EndOfStream,
}

/// The consumer has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame channel closed by consumer")]
pub struct TransportClosed;

#[derive(Default)]
struct Stats {
    sent: AtomicU64,
    received: AtomicU64,
}

pub fn channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = flume::unbounded();
    let stats = Arc::new(CachePadded::new(Stats::default()));
    (
        FrameSender {
            tx,
            stats: stats.clone(),
        },
        FrameReceiver { rx, stats },
    )
}

pub struct FrameSender {
    tx: flume::Sender<FrameMessage>,
    stats: Arc<CachePadded<Stats>>,
}

impl FrameSender {
    pub fn send(&self, message: FrameMessage) -> Result<(), TransportClosed> {
        self.tx.send(message).map_err(|_| TransportClosed)?;
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Whether the receiving end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_disconnected()
    }
}

pub struct FrameReceiver {
    rx: flume::Receiver<FrameMessage>,
    stats: Arc<CachePadded<Stats>>,
}

impl FrameReceiver {
    /// Whether a message can be received right now.
    pub fn poll(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Next queued message, never blocks.
    pub fn try_receive(&self) -> Option<FrameMessage> {
        match self.rx.try_recv() {
            Ok(message) => {
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                Some(message)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Every message queued right now, in send order.
    pub fn drain(&self) -> impl Iterator<Item = FrameMessage> + '_ {
        std::iter::from_fn(|| self.try_receive())
    }

    /// The sender is gone and nothing is left to read.
    pub fn is_finished(&self) -> bool {
        self.rx.is_disconnected() && self.rx.is_empty()
    }

    /// (sent, received) message counts
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.sent.load(Ordering::Relaxed),
            self.stats.received.load(Ordering::Relaxed),
        )
    }
}
