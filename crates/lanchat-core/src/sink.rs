//! Event sink interface
//!
//! The sink is the single ingestion point for everything the core produces.
//! It is called concurrently from the receiving endpoint, from broadcast
//! supervisors and from the local composition path, so implementations must
//! be thread safe and must return quickly.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::message::{ChatEvent, Message, Notice};

/// Consumer of inbound messages, local echoes and notices
pub trait EventSink: Send + Sync {
    /// Hand over one message. Must not block.
    fn deliver(&self, message: Message);

    /// Report a non-fatal condition. Must not block.
    fn notice(&self, notice: Notice);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn deliver(&self, message: Message) {
        (**self).deliver(message)
    }

    fn notice(&self, notice: Notice) {
        (**self).notice(notice)
    }
}

/// Receiving half handed to the presentation layer
pub type EventReceiver = mpsc::UnboundedReceiver<ChatEvent>;

/// Sink that forwards every event into an unbounded channel
///
/// Sending on an unbounded channel never waits, so callers are never held up by
/// a slow consumer. Bounding the display history is left to the consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ChatEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: ChatEvent) {
        if self.sender.send(event).is_err() {
            debug!("Event receiver dropped, discarding event");
        }
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, message: Message) {
        self.send(ChatEvent::Message(message));
    }

    fn notice(&self, notice: Notice) {
        self.send(ChatEvent::Notice(notice));
    }
}
