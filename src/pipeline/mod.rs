pub mod channel;
pub mod pacing;
pub mod producer;

pub use channel::{channel, FrameMessage, FrameReceiver, FrameSender, TransportClosed};
pub use pacing::Pacer;
pub use producer::{FrameProducer, ProducerHandle, Teardown};
